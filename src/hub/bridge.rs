// src/hub/bridge.rs

use crate::connections::tracked::TrackedConnection;
use crate::error::Result;
use crate::listeners::Listener;
use async_trait::async_trait;
use std::sync::Arc;

/// Contract between the WebSocket hub and the service layer. The hub calls
/// through this narrow interface so it never depends on the concrete
/// service type.
#[async_trait]
pub trait ServiceBridge: Send + Sync {
    fn get_all_listeners(&self) -> Vec<Arc<Listener>>;
    fn get_all_connections(&self) -> Vec<Arc<TrackedConnection>>;
    async fn stop_listener(&self, id: &str) -> Result<()>;
    async fn stop_connection(&self, id: &str) -> Result<()>;
    async fn is_port_available(&self, port: &str) -> bool;
    /// `protocol` is the raw numeric discriminator from the UI schema;
    /// decoding it is the bridge's job so unknown tags become one error.
    async fn create_listener(
        &self,
        id: Option<String>,
        protocol: i64,
        port: String,
    ) -> Result<Arc<Listener>>;
}
