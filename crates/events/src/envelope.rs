use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Envelope for a domain event: stream metadata plus the payload.
///
/// The envelope is the **unit of transport** — what goes onto the bus and what
/// the projector consumes. It separates infrastructure concerns (identity,
/// ordering, tracing) from the domain payload:
///
/// - `version` is the aggregate's sequence number for this event; together
///   with the message key (the aggregate id) it gives per-aggregate ordering.
/// - `correlation_id` threads one user action across services; `causation_id`
///   points at the event or request that triggered this one.
/// - `metadata` is a free-form object for transport concerns; consumers must
///   tolerate unknown keys.
///
/// Field names follow the platform's wire contract (camelCase JSON), shared
/// with the non-Rust services consuming these topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E = JsonValue> {
    event_id: Uuid,
    event_type: String,

    aggregate_id: Uuid,
    aggregate_type: String,

    timestamp: DateTime<Utc>,

    /// Monotonically increasing position in the aggregate stream.
    version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    causation_id: Option<String>,

    #[serde(default)]
    metadata: JsonValue,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        version: u64,
        correlation_id: Option<String>,
        causation_id: Option<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            timestamp,
            version,
            correlation_id,
            causation_id,
            metadata: JsonValue::Null,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn metadata(&self) -> &JsonValue {
        &self.metadata
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            "TICKET_BOOKED",
            Uuid::now_v7(),
            "Booking",
            Utc::now(),
            1,
            Some("corr-1".to_string()),
            None,
            json!({"seatNumber": "A1"}),
        );

        let encoded = serde_json::to_string(&env).unwrap();
        let decoded: EventEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn envelope_uses_camel_case_wire_names() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            "TICKET_BOOKED",
            Uuid::now_v7(),
            "Booking",
            Utc::now(),
            1,
            None,
            None,
            json!({}),
        );

        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("eventId").is_some());
        assert!(value.get("aggregateId").is_some());
        assert!(value.get("eventType").is_some());
        assert!(value.get("correlationId").is_none());
    }
}
