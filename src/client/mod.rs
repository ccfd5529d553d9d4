//! Client management system
//!
//! Handles client connections, per-connection state, and the registry of
//! connected clients.

pub mod handler;
pub mod registry;
pub mod session;

pub use handler::handle_client;
pub use registry::ClientRegistry;
pub use session::ClientSession;
