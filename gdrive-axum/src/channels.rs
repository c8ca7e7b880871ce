use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use dashmap::DashMap;
use futures::{stream, Stream, StreamExt};
use gdrive_blob::{NotificationTransport, UploadResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

use crate::AppState;

/// Buffered events per client before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 256;

/// Event sent once when a subscriber connects
pub const CONNECTED_EVENT: &str = "connected";

#[derive(Debug, Clone, Serialize)]
pub struct ChannelMessage {
    pub event: String,
    pub payload: Value,
}

/// Per-client broadcast channels
///
/// A client subscribes under its id; uploads tagged with the same id publish
/// into that channel. Publishing to an id nobody listens on is a no-op.
#[derive(Default)]
pub struct ChannelHub {
    channels: DashMap<String, broadcast::Sender<ChannelMessage>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a client's channel, sweeping channels nobody listens on
    pub fn subscribe(&self, client_id: &str) -> broadcast::Receiver<ChannelMessage> {
        self.prune();
        self.channels
            .entry(client_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscription that drops the client's channel once its last receiver goes
    pub fn stream(self: &Arc<Self>, client_id: &str) -> Subscription {
        Subscription {
            inner: Some(BroadcastStream::new(self.subscribe(client_id))),
            hub: Arc::clone(self),
            client_id: client_id.to_string(),
        }
    }

    /// Remove `client_id`'s channel if it has no receivers left
    pub fn release(&self, client_id: &str) {
        self.channels
            .remove_if(client_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Remove every channel without receivers
    pub fn prune(&self) {
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Channels currently held, listened to or not
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.channels
            .get(client_id)
            .map(|tx| tx.receiver_count() > 0)
            .unwrap_or(false)
    }

    pub fn connected_clients(&self) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .count()
    }
}

#[async_trait]
impl NotificationTransport for ChannelHub {
    async fn publish(&self, client_id: &str, event: &str, payload: Value) -> UploadResult<()> {
        let Some(sender) = self.channels.get(client_id).map(|tx| tx.value().clone()) else {
            debug!(client = client_id, event, "no subscriber for client");
            return Ok(());
        };

        let message = ChannelMessage {
            event: event.to_string(),
            payload,
        };
        if sender.send(message).is_err() {
            // every receiver is gone
            self.release(client_id);
        }
        Ok(())
    }
}

/// Event stream of one client, released from the hub on drop
pub struct Subscription {
    inner: Option<BroadcastStream<ChannelMessage>>,
    hub: Arc<ChannelHub>,
    client_id: String,
}

impl Subscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Stream for Subscription {
    type Item = Result<ChannelMessage, BroadcastStreamRecvError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // the receiver must be gone before the count is checked
        self.inner.take();
        self.hub.release(&self.client_id);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeQuery {
    pub client_id: Option<String>,
}

/// `GET /events?clientId=...` as Server-Sent Events
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = query
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    debug!(client = %client_id, "client subscribed");

    let subscription = state.hub.stream(&client_id);
    let hello = Event::default()
        .event(CONNECTED_EVENT)
        .data(json!({ "clientId": client_id }).to_string());

    let events = subscription.filter_map(|message| async move {
        match message {
            Ok(message) => Some(Ok::<_, Infallible>(
                Event::default()
                    .event(message.event)
                    .data(message.payload.to_string()),
            )),
            Err(err) => {
                warn!(error = %err, "subscriber lagging, events dropped");
                None
            }
        }
    });

    let hello = stream::once(async move { Ok::<_, Infallible>(hello) });
    Sse::new(hello.chain(events)).keep_alive(KeepAlive::default())
}
