//! Line protocol implementation
//!
//! Handles command parsing, dispatch to the storage gateway, and reply
//! generation.

pub mod commands;
pub mod handlers;
pub mod responses;

pub use commands::{Command, CommandStatus, parse_command};
pub use handlers::{CommandContext, handle_command};
