//! Storage result types
//!
//! Defines the values returned by storage operations.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::StorageError;
use crate::storage::naming::StoredName;

/// A file held in the storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub stored_name: StoredName,
    /// Sanitized name the client uploaded under. Only known on the record
    /// returned by `write`; listings cannot recover it.
    pub original_name: Option<String>,
    pub size: u64,
    pub extension: String,
    pub created_at: DateTime<Utc>,
}

/// Lazily read contents of a stored file, delivered in chunks
#[derive(Debug)]
pub struct StoredFileStream {
    name: String,
    size: u64,
    chunks: ReaderStream<File>,
}

impl StoredFileStream {
    pub(crate) fn new(name: String, size: u64, file: File, chunk_size: usize) -> Self {
        Self {
            name,
            size,
            chunks: ReaderStream::with_capacity(file, chunk_size),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size reported by the filesystem when the file was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Next chunk of the file, `None` at end of file
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StorageError> {
        self.chunks.next().await.transpose().map_err(StorageError::from)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, StorageError>> {
        self.chunks.map(|chunk| chunk.map_err(StorageError::from))
    }
}
