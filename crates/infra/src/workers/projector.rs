//! Kafka consumer loop feeding the ticket projection.
//!
//! One logical consumer group; within it the broker assigns partitions, and
//! this loop processes each partition's messages sequentially. Offsets are
//! committed only after the projection applied the event and advanced its
//! checkpoint — an error leaves the offset untouched so the broker
//! redelivers. Messages that keep failing are diverted to the dead-letter
//! topic after `max_attempts`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Offset;
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use faregate_events::EventEnvelope;

use crate::bus::{create_consumer, BusError, TICKET_EVENTS_DLQ_TOPIC, TICKET_EVENTS_TOPIC};
use crate::projections::TicketProjection;

#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    pub brokers: String,
    pub group_id: String,
    pub client_id: String,
    pub topic: String,
    pub dlq_topic: String,
    /// Delivery attempts per message before dead-lettering.
    pub max_attempts: u32,
}

impl ProjectorConfig {
    pub fn new(brokers: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: "faregate.tickets".to_string(),
            client_id: client_id.into(),
            topic: TICKET_EVENTS_TOPIC.to_string(),
            dlq_topic: TICKET_EVENTS_DLQ_TOPIC.to_string(),
            max_attempts: 5,
        }
    }
}

/// Handle to stop the projector task.
pub struct ProjectorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ProjectorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// Start the consumer loop on a background task.
pub fn spawn_projector(
    config: ProjectorConfig,
    projection: Arc<TicketProjection>,
) -> Result<ProjectorHandle, BusError> {
    let consumer = create_consumer(
        &config.brokers,
        &config.group_id,
        &config.client_id,
        &config.topic,
    )?;

    let dlq_producer: FutureProducer = rdkafka::config::ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", format!("{}-dlq", config.client_id))
        .create()
        .map_err(|e| BusError::Connection(format!("failed to create DLQ producer: {e}")))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(run_loop(
        consumer,
        dlq_producer,
        config,
        projection,
        shutdown_rx,
    ));

    Ok(ProjectorHandle {
        shutdown: shutdown_tx,
        join,
    })
}

async fn run_loop(
    consumer: StreamConsumer,
    dlq: FutureProducer,
    config: ProjectorConfig,
    projection: Arc<TicketProjection>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(topic = %config.topic, group = %config.group_id, "projector started");
    let mut attempts: HashMap<(i32, i64), u32> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = consumer.recv() => {
                match received {
                    Err(error) => {
                        error!(%error, "consumer receive failed; backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Ok(message) => {
                        handle_message(
                            &consumer,
                            &dlq,
                            &config,
                            projection.as_ref(),
                            &mut attempts,
                            &message,
                        )
                        .await;
                    }
                }
            }
        }
    }

    info!(topic = %config.topic, "projector stopped");
}

async fn handle_message(
    consumer: &StreamConsumer,
    dlq: &FutureProducer,
    config: &ProjectorConfig,
    projection: &TicketProjection,
    attempts: &mut HashMap<(i32, i64), u32>,
    message: &BorrowedMessage<'_>,
) {
    let position = (message.partition(), message.offset());

    let Some(payload) = message.payload() else {
        warn!(partition = position.0, offset = position.1, "empty message dead-lettered");
        dead_letter(dlq, config, message, "empty payload").await;
        commit(consumer, message);
        return;
    };

    let envelope: EventEnvelope<JsonValue> = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(error) => {
            // Unparseable messages can never succeed; no point retrying.
            warn!(
                partition = position.0,
                offset = position.1,
                %error,
                "unparseable message dead-lettered"
            );
            dead_letter(dlq, config, message, "unparseable envelope").await;
            commit(consumer, message);
            return;
        }
    };

    match projection.apply_envelope(&envelope).await {
        Ok(()) => {
            attempts.remove(&position);
            commit(consumer, message);
        }
        Err(error) => {
            let seen = attempts.entry(position).or_insert(0);
            *seen += 1;

            if *seen >= config.max_attempts {
                error!(
                    event_id = %envelope.event_id(),
                    attempts = *seen,
                    %error,
                    "projection kept failing; dead-lettering"
                );
                dead_letter(dlq, config, message, "max attempts exceeded").await;
                commit(consumer, message);
                attempts.remove(&position);
            } else {
                warn!(
                    event_id = %envelope.event_id(),
                    attempt = *seen,
                    %error,
                    "projection failed; rewinding for redelivery"
                );
                if let Err(seek_error) = consumer.seek(
                    message.topic(),
                    position.0,
                    Offset::Offset(position.1),
                    Duration::from_secs(1),
                ) {
                    error!(%seek_error, "seek failed; relying on rebalance for redelivery");
                }
            }
        }
    }
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(error) = consumer.commit_message(message, CommitMode::Async) {
        warn!(%error, "offset commit failed; duplicate delivery possible");
    }
}

async fn dead_letter(
    dlq: &FutureProducer,
    config: &ProjectorConfig,
    message: &BorrowedMessage<'_>,
    reason: &str,
) {
    let payload = message.payload().unwrap_or_default();
    let key = message.key().unwrap_or_default();
    let headers = OwnedHeaders::new().insert(Header {
        key: "dlqReason",
        value: Some(reason),
    });

    let record = FutureRecord::to(&config.dlq_topic)
        .payload(payload)
        .key(key)
        .headers(headers);

    if let Err((error, _)) = dlq.send(record, Timeout::After(Duration::from_secs(5))).await {
        error!(%error, topic = %config.dlq_topic, "dead-letter publish failed; message dropped");
    }
}
