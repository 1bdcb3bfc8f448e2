//! chainrpc command line client
//!
//! Sends one request and prints the result, like `bitcoin-cli`.

use anyhow::{Context, Result};
use chainrpc_client::{ClientError, RpcClient, WaitOptions};
use chainrpc_core::models::{Config, ServerConfig};
use chainrpc_core::storage::{get_config_dir, ConfigStorage};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "chainrpc")]
#[command(about = "Send a JSON-RPC request to a node or chainrpcd", long_about = None)]
struct Args {
    /// Named server from the config file
    #[arg(short, long)]
    server: Option<String>,

    /// HTTP endpoint, overrides the config file
    #[arg(long, conflicts_with = "socket")]
    url: Option<String>,

    /// Unix socket path, overrides the config file
    #[arg(long)]
    socket: Option<String>,

    /// RPC username for HTTP Basic auth
    #[arg(short, long, requires = "password")]
    user: Option<String>,

    /// RPC password for HTTP Basic auth
    #[arg(short, long, requires = "user")]
    password: Option<String>,

    /// Config file (defaults to <config dir>/chainrpc/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait up to this many seconds for the server to come up first
    #[arg(short, long)]
    wait: Option<u64>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Method to call
    method: String,

    /// Positional parameters; each is parsed as JSON, falling back to a string
    params: Vec<String>,
}

/// `true`, `12` and `{"a":1}` are JSON; `abc` is sent as the string "abc".
fn parse_param(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => ConfigStorage::load_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let storage = ConfigStorage::new(get_config_dir()?);
            Ok(storage.load()?)
        }
    }
}

fn server_config(args: &Args) -> Result<ServerConfig> {
    let mut server = match (&args.url, &args.socket) {
        (Some(url), _) => ServerConfig::http(url),
        (None, Some(socket)) => ServerConfig::unix(socket),
        (None, None) => {
            let config = load_config(args.config.as_ref())?;
            config.server(args.server.as_deref())?.clone()
        }
    };

    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        server = server.with_credentials(user, password);
    }
    Ok(server)
}

fn print_result(result: &Value) -> Result<()> {
    match result {
        Value::Null => {}
        Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn exit_code_for(err: &ClientError) -> ExitCode {
    match err {
        ClientError::Transport(_) => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let server = server_config(&args)?;
    let client = RpcClient::from_config(&server)?;

    if let Some(secs) = args.wait {
        match client
            .wait_for_server_with(Duration::from_secs(secs), &WaitOptions::default())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                eprintln!("error: could not reach server after {} seconds", secs);
                return Ok(ExitCode::from(2));
            }
            Err(e) => {
                eprintln!("error: {}", e);
                return Ok(exit_code_for(&e));
            }
        }
    }

    let params = args.params.iter().map(|p| parse_param(p)).collect();
    let response = match client.call(&args.method, params).await {
        Ok(response) => response,
        Err(e) => {
            match e {
                ClientError::Transport(ref t) if t.is_connect() => {
                    eprintln!("error: could not reach server: {}", t)
                }
                ref other => eprintln!("error: {}", other),
            }
            return Ok(exit_code_for(&e));
        }
    };

    match response.into_result() {
        Ok(result) => {
            print_result(&result)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(rpc_error) => {
            eprintln!("error code: {}", rpc_error.code);
            eprintln!("error message:\n{}", rpc_error.message);
            Ok(ExitCode::from(1))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(&args.log_level)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
