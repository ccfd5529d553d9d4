//! Error types
//!
//! Defines domain-specific error types for each module of the upload server.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Reason a client-supplied upload name was refused by the sanitizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameRejection {
    #[error("name is empty")]
    EmptyName,
    #[error("file extension is not allowed")]
    DisallowedExtension,
    #[error("name contains invalid characters")]
    InvalidCharacters,
    #[error("name attempts directory traversal")]
    TraversalAttempt,
    #[error("name exceeds 255 bytes")]
    NameTooLong,
}

impl NameRejection {
    /// Stable reason code, suitable for protocol replies and logs
    pub fn code(&self) -> &'static str {
        match self {
            NameRejection::EmptyName => "EmptyName",
            NameRejection::DisallowedExtension => "DisallowedExtension",
            NameRejection::InvalidCharacters => "InvalidCharacters",
            NameRejection::TraversalAttempt => "TraversalAttempt",
            NameRejection::NameTooLong => "NameTooLong",
        }
    }
}

/// Storage gateway errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid name: {0}")]
    InvalidName(NameRejection),

    #[error("payload exceeds the {limit} byte limit ({received} bytes)")]
    SizeExceeded { limit: u64, received: u64 },

    /// A resolved path left the storage root. Indicates a logic defect.
    #[error("resolved path escapes the storage root: {}", .0.display())]
    PathEscape(PathBuf),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage I/O error: {0}")]
    StorageIo(#[from] io::Error),
}

impl From<NameRejection> for StorageError {
    fn from(reason: NameRejection) -> Self {
        StorageError::InvalidName(reason)
    }
}

/// Invalid storage settings detected at startup
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("size limit must be greater than 0")]
    ZeroSizeLimit,

    #[error("buffer size must be greater than 0")]
    ZeroBufferSize,

    #[error("at least one allowed extension is required")]
    EmptyExtensionSet,

    #[error("invalid extension in allow-list: {0:?}")]
    InvalidExtension(String),

    #[error("extension {0:?} is blocked and can never be allowed")]
    BlockedExtension(String),

    #[error("storage root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("storage root {} is unavailable: {source}", .path.display())]
    RootUnavailable { path: PathBuf, source: io::Error },
}

/// Top-level error for the server binary
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("storage settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("failed to bind to {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
