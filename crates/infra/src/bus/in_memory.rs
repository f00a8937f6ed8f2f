//! In-memory event bus used by tests: records every publish and fans out to
//! subscribers over unbounded channels.

use std::sync::Mutex;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use faregate_events::EventEnvelope;

use super::{BusError, EventPublisher};

#[derive(Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EventEnvelope<JsonValue>>>>,
    published: Mutex<Vec<EventEnvelope<JsonValue>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope<JsonValue>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Everything published so far, in order. Test inspection helper.
    pub fn published(&self) -> Vec<EventEnvelope<JsonValue>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), BusError> {
        self.published.lock().unwrap().push(envelope.clone());
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        Ok(())
    }
}
