use std::sync::Arc;

use axum::extract::ws::Message;
use futures::SinkExt;
use lingolive_translation::OutboundEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;

/// Drains pipeline events and writes each to its target connection.
/// A single consumer keeps caption/audio delivery in pipeline emission
/// order; a closed or vanished target drops the event silently.
pub async fn run(registry: Arc<ConnectionRegistry>, mut outbound_rx: mpsc::Receiver<OutboundEvent>) {
    while let Some(outbound) = outbound_rx.recv().await {
        let Some(session) = registry.get(&outbound.connection_id) else {
            debug!(connection_id = %outbound.connection_id, "event target gone, dropped");
            continue;
        };
        if !session.is_open() {
            continue;
        }

        let text = match serde_json::to_string(&outbound.event) {
            Ok(text) => text,
            Err(e) => {
                warn!(%e, "failed to serialize server event");
                continue;
            }
        };

        let mut sink = session.sender.lock().await;
        if let Err(e) = sink.send(Message::text(text)).await {
            debug!(connection_id = %outbound.connection_id, %e, "event send failed, dropped");
        }
    }
}
