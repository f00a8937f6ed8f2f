//! Infrastructure for the Faregate ticketing service: the transactional write
//! path, the Kafka event bus, the Redis cache, the read model and its
//! projector, and the background workers.
//!
//! Every port (write store, read store, cache, bus) has a production
//! implementation and an in-memory double with the same semantics for tests.

pub mod bus;
pub mod cache;
pub mod command_service;
pub mod projections;
pub mod query_service;
pub mod read_store;
pub mod workers;
pub mod write_store;

pub use bus::{BusError, EventPublisher, TICKET_EVENTS_DLQ_TOPIC, TICKET_EVENTS_TOPIC};
pub use cache::TicketCache;
pub use command_service::{CommandError, CommandService};
pub use query_service::{QueryError, QueryService};
pub use read_store::{ReadStore, ReadStoreError, TicketPage, TicketView};
pub use write_store::{Correlation, EventRecord, WriteStore, WriteStoreError};
