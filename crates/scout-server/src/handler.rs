//! Handlers: async callbacks taking a JSON payload and returning JSON

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// A callback for webhook messages or custom endpoint requests
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, payload: Value) -> Result<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, payload: Value) -> Result<Value> {
        (self.0)(payload).await
    }
}

/// Wrap an async closure as a shareable [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Run a handler on its own task so a panic surfaces as an error instead of
/// tearing down the connection.
pub(crate) async fn invoke(handler: Arc<dyn Handler>, payload: Value) -> Result<Value> {
    match tokio::spawn(async move { handler.call(payload).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow!("handler panicked")),
        Err(e) => Err(anyhow!("handler task failed: {}", e)),
    }
}

/// Per-sender handlers for webhook messages
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the handler for `sender`; returns true if one was replaced
    pub fn insert(&mut self, sender: impl Into<String>, handler: Arc<dyn Handler>) -> bool {
        let sender = sender.into();
        info!("Registered handler for agent: {}", sender);
        self.handlers.insert(sender, handler).is_some()
    }

    pub fn get(&self, sender: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(sender).cloned()
    }

    pub fn contains(&self, sender: &str) -> bool {
        self.handlers.contains_key(sender)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
