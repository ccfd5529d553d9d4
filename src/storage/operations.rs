//! Storage operations
//!
//! The storage gateway: the only component that touches the storage root.
//! Handles write, read, delete and list, enforcing the size limit, the
//! extension allow-list and path containment.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::fs::{self, File, OpenOptions, ReadDir};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{SettingsError, StorageError};
use crate::storage::filesystem::{
    TempFileGuard, created_at, remove_stale_uploads, temp_upload_name,
};
use crate::storage::naming::{StoredName, UniqueNameGenerator};
use crate::storage::results::{StoredFile, StoredFileStream};
use crate::storage::settings::{AllowedExtensionSet, SizeLimit, StorageSettings};
use crate::storage::validation::{
    SafeBaseName, ensure_contained, resolve_new_path, sanitize, validate_stored_name,
};

const MAX_RETRIES: u32 = 3;
const MAX_NAME_ATTEMPTS: usize = 3;

/// A stored file located inside the root
struct ResolvedFile<'a> {
    name: &'a str,
    /// `root/name` as joined, used for removal
    path: PathBuf,
    /// Symlink-free form, used for reading
    canonical: PathBuf,
}

/// Gateway owning one storage root
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    size_limit: SizeLimit,
    allowed_extensions: AllowedExtensionSet,
    buffer_size: usize,
    names: UniqueNameGenerator,
}

impl Storage {
    /// Open the storage root described by `settings` with OS randomness.
    pub async fn open(settings: &StorageSettings) -> Result<Self, SettingsError> {
        Self::open_with(settings, UniqueNameGenerator::default()).await
    }

    /// Open the storage root with a specific name generator.
    ///
    /// Creates the root if missing, canonicalizes it and sweeps temporary
    /// files left by interrupted uploads.
    pub async fn open_with(
        settings: &StorageSettings,
        names: UniqueNameGenerator,
    ) -> Result<Self, SettingsError> {
        let requested = settings.root();
        let unavailable = |source: io::Error| SettingsError::RootUnavailable {
            path: requested.to_path_buf(),
            source,
        };

        match fs::metadata(requested).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(SettingsError::RootNotDirectory(requested.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(requested).await.map_err(unavailable)?;
                info!("Created storage root {}", requested.display());
            }
            Err(e) => return Err(unavailable(e)),
        }

        let root = fs::canonicalize(requested).await.map_err(unavailable)?;
        remove_stale_uploads(&root).await.map_err(unavailable)?;

        info!(
            "Storage root {} (limit {} bytes, extensions: {})",
            root.display(),
            settings.size_limit().bytes(),
            settings.allowed_extensions().iter().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            root,
            size_limit: settings.size_limit(),
            allowed_extensions: settings.allowed_extensions().clone(),
            buffer_size: settings.buffer_size(),
            names,
        })
    }

    /// Canonical storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn size_limit(&self) -> SizeLimit {
        self.size_limit
    }

    pub fn allowed_extensions(&self) -> &AllowedExtensionSet {
        &self.allowed_extensions
    }

    /// Size and name checks that need no I/O.
    ///
    /// Lets a caller refuse an upload before any payload is transferred.
    pub fn preflight(
        &self,
        raw_name: &str,
        declared_size: Option<u64>,
    ) -> Result<SafeBaseName, StorageError> {
        let limit = self.size_limit.bytes();
        if let Some(declared) = declared_size {
            if declared > limit {
                warn!(
                    "Rejected upload {:?}: declared {} bytes exceeds limit of {}",
                    raw_name, declared, limit
                );
                return Err(StorageError::SizeExceeded {
                    limit,
                    received: declared,
                });
            }
        }

        sanitize(raw_name, &self.allowed_extensions).map_err(|reason| {
            warn!("Rejected upload name {:?}: {}", raw_name, reason.code());
            StorageError::InvalidName(reason)
        })
    }

    /// Store a new file from `content` under a generated name.
    ///
    /// Bytes are streamed into a temporary file and renamed into place only
    /// after the whole payload was received within the size limit.
    pub async fn write<R>(
        &self,
        raw_name: &str,
        mut content: R,
        declared_size: Option<u64>,
    ) -> Result<StoredFile, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let base = self.preflight(raw_name, declared_size)?;
        let (stored_name, final_path) = self.allocate(&base).await?;

        let temp_path = resolve_new_path(&self.root, &temp_upload_name(stored_name.as_str()))?;
        let guard = TempFileGuard::new(temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(guard.path())
            .await?;

        let received = self.copy_limited(&mut content, &mut file).await?;

        if let Some(declared) = declared_size {
            if received != declared {
                let kind = if received < declared {
                    io::ErrorKind::UnexpectedEof
                } else {
                    io::ErrorKind::InvalidData
                };
                warn!(
                    "Upload {:?} declared {} bytes but sent {}",
                    raw_name, declared, received
                );
                return Err(StorageError::StorageIo(io::Error::new(
                    kind,
                    format!("expected {declared} bytes, received {received}"),
                )));
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(guard.path(), &final_path).await {
            error!(
                "Failed to move {} into place as {}: {}",
                guard.path().display(),
                final_path.display(),
                e
            );
            return Err(e.into());
        }
        guard.disarm();

        let created = match fs::metadata(&final_path).await {
            Ok(metadata) => created_at(&metadata),
            Err(_) => Utc::now(),
        };

        info!(
            "Stored {:?} as {} ({} bytes)",
            base.name(),
            stored_name,
            received
        );

        Ok(StoredFile {
            stored_name,
            original_name: Some(base.name().to_string()),
            size: received,
            extension: base.extension().to_string(),
            created_at: created,
        })
    }

    /// Open a stored file for streaming.
    pub async fn read(&self, requested_name: &str) -> Result<StoredFileStream, StorageError> {
        let resolved = self.resolve_existing(requested_name).await?;

        let file = match File::open(&resolved.canonical).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(resolved.name.to_string()));
            }
            Err(e) => {
                error!("Failed to open {}: {}", resolved.canonical.display(), e);
                return Err(e.into());
            }
        };
        let size = file.metadata().await?.len();

        debug!("Opened {} for reading ({} bytes)", resolved.name, size);

        Ok(StoredFileStream::new(
            resolved.name.to_string(),
            size,
            file,
            self.buffer_size,
        ))
    }

    /// Remove a stored file.
    pub async fn delete(&self, requested_name: &str) -> Result<(), StorageError> {
        let resolved = self.resolve_existing(requested_name).await?;

        // Delete with retries for transient permission issues
        for attempt in 1..=MAX_RETRIES {
            match fs::remove_file(&resolved.path).await {
                Ok(()) => {
                    info!("Deleted {}", resolved.name);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(resolved.name.to_string()));
                }
                Err(e) if attempt < MAX_RETRIES && e.kind() == io::ErrorKind::PermissionDenied => {
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => {
                    error!("Failed to delete {}: {}", resolved.path.display(), e);
                    return Err(e.into());
                }
            }
        }

        Err(StorageError::StorageIo(io::Error::other(
            "failed to delete file after retries",
        )))
    }

    /// Files directly beneath the root, sorted by stored name.
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = self.read_root().await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!("Skipping non UTF-8 entry {:?}", file_name);
                continue;
            };
            if validate_stored_name(name).is_err() {
                continue;
            }
            let Some((_, ext)) = name.rsplit_once('.') else {
                continue;
            };
            if !self.allowed_extensions.contains(ext) {
                debug!("Skipping {} with unlisted extension", name);
                continue;
            }

            // file_type() does not follow symlinks, so links are skipped too
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between enumeration and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            files.push(StoredFile {
                stored_name: StoredName::from_existing(name),
                original_name: None,
                size: metadata.len(),
                extension: ext.to_ascii_lowercase(),
                created_at: created_at(&metadata),
            });
        }

        files.sort_by(|a, b| a.stored_name.cmp(&b.stored_name));

        debug!("Listed {} file(s) in {}", files.len(), self.root.display());
        Ok(files)
    }

    async fn read_root(&self) -> Result<ReadDir, StorageError> {
        let mut attempt = 1;
        loop {
            match fs::read_dir(&self.root).await {
                Ok(entries) => return Ok(entries),
                Err(e) if attempt < MAX_RETRIES && e.kind() == io::ErrorKind::PermissionDenied => {
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Failed to list {}: {}", self.root.display(), e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Pick a stored name not present on disk.
    async fn allocate(&self, base: &SafeBaseName) -> Result<(StoredName, PathBuf), StorageError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = self.names.generate(base);
            let path = resolve_new_path(&self.root, name.as_str())?;
            if !fs::try_exists(&path).await? {
                return Ok((name, path));
            }
            warn!("Generated name {} already exists, regenerating", name);
        }

        Err(StorageError::StorageIo(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate a unique stored name",
        )))
    }

    /// Copy until EOF, failing as soon as the running total passes the limit.
    async fn copy_limited<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<u64, StorageError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let limit = self.size_limit.bytes();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut received: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            received += n as u64;
            if received > limit {
                warn!(
                    "Upload aborted after {} bytes: limit is {} bytes",
                    received, limit
                );
                return Err(StorageError::SizeExceeded { limit, received });
            }

            writer.write_all(&buffer[..n]).await?;
        }

        Ok(received)
    }

    /// Validate a stored name and locate it inside the root.
    async fn resolve_existing<'a>(
        &self,
        requested_name: &'a str,
    ) -> Result<ResolvedFile<'a>, StorageError> {
        let name = validate_stored_name(requested_name).map_err(|reason| {
            warn!("Rejected stored name {:?}: {}", requested_name, reason.code());
            StorageError::InvalidName(reason)
        })?;

        let path = resolve_new_path(&self.root, name)?;

        let canonical = match fs::canonicalize(&path).await {
            Ok(canonical) => canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        ensure_contained(&self.root, &canonical)?;

        match fs::metadata(&canonical).await {
            Ok(metadata) if metadata.is_file() => Ok(ResolvedFile {
                name,
                path,
                canonical,
            }),
            Ok(_) => Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
