pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod utils;

pub use config::ServerConfig;
pub use error::{NameRejection, ServerError, SettingsError, StorageError};
pub use server::Server;
pub use storage::{Storage, StorageSettings, StoredFile, StoredName};
