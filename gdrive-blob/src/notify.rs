use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ProgressEvent, ProgressSink, UploadError, UploadResult};

/// Event name progress updates are published under
pub const PROGRESS_EVENT: &str = "file-upload";

/// Push channel towards connected clients
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn publish(&self, client_id: &str, event: &str, payload: Value) -> UploadResult<()>;
}

/// Transport that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

#[async_trait]
impl NotificationTransport for NoopTransport {
    async fn publish(&self, _client_id: &str, _event: &str, _payload: Value) -> UploadResult<()> {
        Ok(())
    }
}

/// A transport bound to one client id
#[derive(Clone)]
pub struct ClientChannel {
    transport: Arc<dyn NotificationTransport>,
    client_id: String,
}

impl ClientChannel {
    pub fn new<S: Into<String>>(transport: Arc<dyn NotificationTransport>, client_id: S) -> Self {
        Self {
            transport,
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl ProgressSink for ClientChannel {
    async fn publish(&self, event: ProgressEvent) -> UploadResult<()> {
        let payload = serde_json::to_value(&event)
            .map_err(|e| UploadError::invalid(format!("Unserializable progress event: {}", e)))?;
        self.transport
            .publish(&self.client_id, PROGRESS_EVENT, payload)
            .await
    }
}
