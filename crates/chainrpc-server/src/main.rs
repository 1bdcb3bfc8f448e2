//! chainrpc Daemon
//!
//! Serves the echo service over a Unix socket and, optionally, HTTP.

use anyhow::{Context, Result};
use chainrpc_core::models::Config;
use chainrpc_core::storage::{init_config_dir, init_data_dir, ConfigStorage};
use chainrpc_server::{http, Dispatcher, EchoService, IpcServer, TokenShutdown};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "chainrpcd")]
#[command(about = "chainrpc daemon - JSON-RPC echo server", long_about = None)]
struct Args {
    /// Socket path for IPC (overrides config)
    #[arg(short, long)]
    socket: Option<String>,

    /// Also listen for HTTP on this address, e.g. 127.0.0.1:18443 (overrides config)
    #[arg(long)]
    http: Option<String>,

    /// Username required on HTTP requests
    #[arg(long, requires = "rpc_password")]
    rpc_user: Option<String>,

    /// Password required on HTTP requests
    #[arg(long, requires = "rpc_user")]
    rpc_password: Option<String>,

    /// Log level (overrides config)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Config file (defaults to <config dir>/chainrpc/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => ConfigStorage::load_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigStorage::new(init_config_dir()?).load()?,
    };

    if let Some(ref socket) = args.socket {
        config.daemon.socket_path = socket.clone();
    }
    if let Some(ref addr) = args.http {
        config.daemon.http_addr = Some(addr.clone());
    }
    if let Some(ref level) = args.log_level {
        config.daemon.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(log_level: &str) -> Result<PathBuf> {
    let data_dir = init_data_dir()?;
    let log_file_path = data_dir.join("chainrpcd.log");

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    use tracing_subscriber::fmt::writer::MakeWriterExt;
    let stdout_writer = std::io::stdout.with_max_level(tracing::Level::INFO);
    let file_writer = log_file.with_max_level(tracing::Level::DEBUG);

    tracing_subscriber::fmt()
        .with_writer(stdout_writer.and(file_writer))
        .with_env_filter(log_level)
        .with_ansi(false)
        .init();

    Ok(log_file_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let log_file_path = init_logging(&config.daemon.log_level)?;

    tracing::info!("chainrpc daemon starting...");
    tracing::info!("Socket path: {}", config.daemon.socket_path);
    tracing::info!("Log file: {}", log_file_path.display());

    let shutdown = CancellationToken::new();
    let stopper = Arc::new(TokenShutdown::new(shutdown.clone()));
    let service = Arc::new(EchoService::new(stopper));
    let dispatcher = Arc::new(Dispatcher::for_service(service));

    let ipc_server = Arc::new(
        IpcServer::new(&config.daemon.socket_path, dispatcher.clone())
            .with_shutdown(shutdown.clone()),
    );
    let ipc_handle = tokio::spawn(ipc_server.start());

    let http_handle = match config.daemon.http_addr {
        Some(ref addr) => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
            let router = match (&args.rpc_user, &args.rpc_password) {
                (Some(user), Some(password)) => http::router_with_auth(dispatcher, user, password),
                _ => http::router(dispatcher),
            };
            let server = http::serve(listener, router, shutdown.clone());
            Some(tokio::spawn(server))
        }
        None => None,
    };

    tracing::info!("Daemon ready and listening");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Interrupted");
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("Shutting down...");
    shutdown.cancel();

    match ipc_handle.await {
        Ok(Err(e)) => tracing::error!("IPC server error: {}", e),
        Err(e) => tracing::error!("IPC server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    if let Some(handle) = http_handle {
        match handle.await {
            Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
            Err(e) => tracing::error!("HTTP server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    Ok(())
}
