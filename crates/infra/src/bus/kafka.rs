//! Kafka-backed event bus (works with any Kafka-compatible broker).
//!
//! Producer: async sends with per-message delivery confirmation. The message
//! key is the booking id, so events of one aggregate stay ordered within
//! their partition. Headers carry `eventType`, `correlationId`, and
//! `timestamp` for consumers that filter without deserializing the body.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::Value as JsonValue;
use tracing::debug;

use faregate_events::EventEnvelope;

use super::{BusError, EventPublisher, TICKET_EVENTS_TOPIC};

pub struct KafkaEventBus {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaEventBus {
    pub fn builder() -> KafkaEventBusBuilder {
        KafkaEventBusBuilder::default()
    }

    /// Producer with default settings (`acks=all`, 30 s publish deadline).
    pub fn new(brokers: &str, client_id: &str) -> Result<Self, BusError> {
        Self::builder().brokers(brokers).client_id(client_id).build()
    }
}

#[derive(Default)]
pub struct KafkaEventBusBuilder {
    brokers: Option<String>,
    client_id: Option<String>,
    topic: Option<String>,
    acks: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaEventBusBuilder {
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// "0", "1", or "all".
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<KafkaEventBus, BusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| BusError::Connection("brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(30));

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", self.acks.as_deref().unwrap_or("all"));
        if let Some(client_id) = &self.client_id {
            config.set("client.id", client_id);
        }

        let producer: FutureProducer = config
            .create()
            .map_err(|e| BusError::Connection(format!("failed to create producer: {e}")))?;

        Ok(KafkaEventBus {
            producer,
            topic: self.topic.unwrap_or_else(|| TICKET_EVENTS_TOPIC.to_string()),
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for KafkaEventBus {
    async fn publish(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), BusError> {
        let payload = serde_json::to_vec(envelope).map_err(|e| BusError::Publish {
            topic: self.topic.clone(),
            reason: format!("failed to serialize envelope: {e}"),
        })?;

        let key = envelope.aggregate_id().to_string();
        let timestamp = envelope.timestamp().to_rfc3339();
        let mut headers = OwnedHeaders::new()
            .insert(Header {
                key: "eventType",
                value: Some(envelope.event_type()),
            })
            .insert(Header {
                key: "timestamp",
                value: Some(timestamp.as_str()),
            });
        if let Some(correlation_id) = envelope.correlation_id() {
            headers = headers.insert(Header {
                key: "correlationId",
                value: Some(correlation_id),
            });
        }

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&key)
            .headers(headers);

        match self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
        {
            Ok((partition, offset)) => {
                debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    event_type = %envelope.event_type(),
                    aggregate_id = %envelope.aggregate_id(),
                    "event published"
                );
                Ok(())
            }
            Err((error, _)) => Err(BusError::Publish {
                topic: self.topic.clone(),
                reason: error.to_string(),
            }),
        }
    }
}

/// Consumer for the projector: one consumer group, manual commits (the offset
/// advances only after the read model and checkpoint are updated).
pub fn create_consumer(
    brokers: &str,
    group_id: &str,
    client_id: &str,
    topic: &str,
) -> Result<StreamConsumer, BusError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("client.id", client_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .create()
        .map_err(|e| BusError::Connection(format!("failed to create consumer: {e}")))?;

    consumer
        .subscribe(&[topic])
        .map_err(|e| BusError::Connection(format!("failed to subscribe to {topic}: {e}")))?;

    Ok(consumer)
}
