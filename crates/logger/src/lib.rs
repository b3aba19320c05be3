//! Tracing setup shared by the Pulse binaries.

mod subscriber;

pub use subscriber::{init, init_with_level};
