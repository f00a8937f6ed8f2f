//! Read-model projections driven by the event bus.

mod ticket_view;

pub use ticket_view::{ProjectionError, TicketProjection, PROJECTION_NAME};
