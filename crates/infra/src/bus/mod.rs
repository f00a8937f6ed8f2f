//! Event bus port: partitioned, at-least-once, ordered per message key.

mod in_memory;
mod kafka;

pub use in_memory::InMemoryEventBus;
pub use kafka::{create_consumer, KafkaEventBus, KafkaEventBusBuilder};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use faregate_events::EventEnvelope;

/// Topic carrying every ticket event, keyed by booking id.
pub const TICKET_EVENTS_TOPIC: &str = "ticket-events";

/// Dead-letter topic for messages the projector gave up on.
pub const TICKET_EVENTS_DLQ_TOPIC: &str = "ticket-events.dlq";

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// Producer side of the bus. The message key is the aggregate id, which pins
/// all events of one booking to one partition (ordered delivery).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), BusError>;
}
