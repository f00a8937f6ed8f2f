//! Tracing/logging initialization for Faregate services.

mod tracing_init;

pub use tracing_init::init;
