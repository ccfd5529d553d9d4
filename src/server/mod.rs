//! Server core functionality
//!
//! The listener and accept loop. Each connection is handled in its own task.

pub mod core;

pub use core::Server;
