//! Live handlers keyed by endpoint
//!
//! Reconfiguration replaces the `Arc` stored for an endpoint. Requests that
//! already cloned the previous handler finish on it.

use crate::error::Result;
use crate::factory::ProxyFactory;
use crate::handler::ProxyHandler;
use gateway_core::{EndpointConfig, EndpointId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct EndpointRegistry {
    handlers: RwLock<HashMap<EndpointId, Arc<ProxyHandler>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler, returning the one it replaces
    pub async fn register(&self, id: EndpointId, handler: ProxyHandler) -> Option<Arc<ProxyHandler>> {
        let handler = Arc::new(handler);
        info!("Registering handler {} for endpoint {}", handler.label(), id);
        self.handlers.write().await.insert(id, handler)
    }

    /// Build and install the handler for `config`. Nothing changes on failure.
    pub async fn configure(&self, factory: &ProxyFactory, config: &EndpointConfig) -> Result<()> {
        let handler = factory.build(config)?;
        self.register(config.id, handler).await;
        Ok(())
    }

    pub async fn get(&self, id: EndpointId) -> Option<Arc<ProxyHandler>> {
        self.handlers.read().await.get(&id).cloned()
    }

    pub async fn deregister(&self, id: EndpointId) -> Option<Arc<ProxyHandler>> {
        let removed = self.handlers.write().await.remove(&id);
        if removed.is_some() {
            info!("Deregistered endpoint {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}
