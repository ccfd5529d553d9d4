//! Utility functions

pub mod logging;
pub mod network;

pub use logging::setup_logging;
pub use network::IdleTimeout;
