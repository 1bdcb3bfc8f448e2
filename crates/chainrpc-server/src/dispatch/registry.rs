//! Method registry

use super::params::FromParams;
use super::HandlerError;
use chainrpc_core::RpcError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub(crate) type BoxedHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Help text for one method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHelp {
    pub summary: String,
    pub detail: String,
}

pub(crate) struct MethodEntry {
    pub(crate) handler: BoxedHandler,
    pub(crate) help: Option<MethodHelp>,
}

/// Method name to handler table, built once before serving
#[derive(Default)]
pub struct MethodRegistry {
    pub(crate) methods: BTreeMap<String, MethodEntry>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier registration.
    ///
    /// The handler's parameter tuple `P` decides how many positional params
    /// are accepted and what they deserialize into.
    pub fn register<P, R, F, Fut>(&mut self, name: &str, handler: F) -> &mut Self
    where
        P: FromParams,
        R: Serialize + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        self.insert(name, erase(handler), None)
    }

    pub fn register_with_help<P, R, F, Fut>(
        &mut self,
        name: &str,
        summary: &str,
        detail: &str,
        handler: F,
    ) -> &mut Self
    where
        P: FromParams,
        R: Serialize + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    {
        let help = MethodHelp {
            summary: summary.to_string(),
            detail: detail.to_string(),
        };
        self.insert(name, erase(handler), Some(help))
    }

    fn insert(&mut self, name: &str, handler: BoxedHandler, help: Option<MethodHelp>) -> &mut Self {
        self.methods
            .insert(name.to_string(), MethodEntry { handler, help });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn help(&self, name: &str) -> Option<&MethodHelp> {
        self.methods.get(name).and_then(|entry| entry.help.as_ref())
    }

    pub(crate) fn help_texts(&self) -> BTreeMap<String, MethodHelp> {
        self.methods
            .iter()
            .filter_map(|(name, entry)| entry.help.clone().map(|help| (name.clone(), help)))
            .collect()
    }

    pub(crate) fn get(&self, name: &str) -> Option<BoxedHandler> {
        self.methods.get(name).map(|entry| entry.handler.clone())
    }
}

fn erase<P, R, F, Fut>(handler: F) -> BoxedHandler
where
    P: FromParams,
    R: Serialize + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
{
    let handler = Arc::new(handler);
    Arc::new(move |params: Vec<Value>| {
        let handler = handler.clone();
        async move {
            let args = P::from_params(params).map_err(RpcError::invalid_params)?;
            let result = handler(args).await.map_err(HandlerError::into_rpc_error)?;
            serde_json::to_value(result).map_err(RpcError::server_exception)
        }
        .boxed()
    })
}

/// `help` listing: one `name    summary` line per documented method
pub(crate) fn all_methods_help(texts: &BTreeMap<String, MethodHelp>) -> String {
    texts
        .iter()
        .map(|(name, help)| format!("{}    {}", name, help.summary))
        .collect::<Vec<_>>()
        .join("\n")
}
