//! Sample echo service, served by `chainrpcd`

use crate::dispatch::{HandlerError, MethodRegistry, RpcService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const HELP: &str = "echo message\nhelp\nstop\n";

/// Something that can stop the running server
pub trait ShutdownService: Send + Sync {
    /// Begin stopping and return a status message for the caller.
    fn stop_server(&self) -> String;
}

/// Shutdown that does nothing, for embedding and tests
pub struct NoopShutdown;

impl ShutdownService for NoopShutdown {
    fn stop_server(&self) -> String {
        "server stop received (stop behavior is default/undefined)".to_string()
    }
}

/// Cancels a token the daemon's serve loops are watching
pub struct TokenShutdown {
    token: CancellationToken,
}

impl TokenShutdown {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl ShutdownService for TokenShutdown {
    fn stop_server(&self) -> String {
        info!("Stop requested over RPC");
        self.token.cancel();
        "chainrpcd stopping".to_string()
    }
}

pub struct EchoService {
    shutdown: Arc<dyn ShutdownService>,
}

impl EchoService {
    pub fn new(shutdown: Arc<dyn ShutdownService>) -> Self {
        Self { shutdown }
    }
}

impl RpcService for EchoService {
    fn register(self: Arc<Self>, registry: &mut MethodRegistry) {
        registry
            .register("echo", |(message,): (String,)| async move {
                debug!("echo {}", message);
                Ok::<_, HandlerError>(message)
            })
            .register("help", |(): ()| async { Ok::<_, HandlerError>(HELP) });

        let service = self.clone();
        registry.register("stop", move |(): ()| {
            let service = service.clone();
            async move { Ok::<_, HandlerError>(service.shutdown.stop_server()) }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use chainrpc_core::{JsonRpcService, Request};
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_help_stop() {
        let token = CancellationToken::new();
        let shutdown = Arc::new(TokenShutdown::new(token.clone()));
        let service = Arc::new(EchoService::new(shutdown));
        let dispatcher = Dispatcher::for_service(service);

        let resp = dispatcher
            .call(Request::new("echo", vec![json!("hello")], 1i64))
            .await;
        assert_eq!(resp.result, Some(json!("hello")));

        let resp = dispatcher.call(Request::new("help", vec![], 2i64)).await;
        assert_eq!(resp.result, Some(json!(HELP)));

        assert!(!token.is_cancelled());
        let resp = dispatcher.call(Request::new("stop", vec![], 3i64)).await;
        assert_eq!(resp.result, Some(json!("chainrpcd stopping")));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_echo_requires_message() {
        let dispatcher =
            Dispatcher::for_service(Arc::new(EchoService::new(Arc::new(NoopShutdown))));

        let resp = dispatcher.call(Request::new("echo", vec![], 1i64)).await;
        assert_eq!(resp.error.unwrap().code, -32602);

        let resp = dispatcher
            .call(Request::new("echo", vec![json!("a"), json!("b")], 2i64))
            .await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }
}
