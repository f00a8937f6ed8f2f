//! Background workers: the bus-driven projector and the expiry sweeper.

mod projector;
mod sweeper;

pub use projector::{spawn_projector, ProjectorConfig, ProjectorHandle};
pub use sweeper::{ExpirySweeper, SweeperConfig, SweeperHandle};
