//! Structured logging setup for the ticketing service.
//!
//! JSON lines filtered via `RUST_LOG` (defaults to `info`), with the current
//! span attached to each line so command and projector events stay traceable.

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize process-wide logging, tagged with the service name.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_target(false)
        .try_init()
        .is_ok();

    // First line of every boot carries the service identity.
    if installed {
        info!(service, "structured logging initialized");
    }
}
