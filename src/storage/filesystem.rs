//! File system helpers
//!
//! Temporary upload files, stale-file cleanup and metadata conversion.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

pub const TEMP_UPLOAD_PREFIX: &str = ".upload-";
pub const TEMP_UPLOAD_SUFFIX: &str = ".tmp";

/// Name of the hidden temporary file an upload is streamed into
pub fn temp_upload_name(stored_name: &str) -> String {
    format!("{TEMP_UPLOAD_PREFIX}{stored_name}{TEMP_UPLOAD_SUFFIX}")
}

pub fn is_temp_upload_name(name: &str) -> bool {
    name.starts_with(TEMP_UPLOAD_PREFIX) && name.ends_with(TEMP_UPLOAD_SUFFIX)
}

/// Removes a temporary upload file when dropped, unless it was committed.
///
/// Also runs when the upload future is dropped mid-transfer.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing to clean up.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Delete temporary upload files left behind by an earlier crash.
pub async fn remove_stale_uploads(root: &Path) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_temp_upload_name(name) || !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale upload {}: {}", name, e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale temporary upload(s) from {}", removed, root.display());
    }
    Ok(removed)
}

/// Creation time when the platform records it, otherwise modification time
pub fn created_at(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_are_recognized() {
        let name = temp_upload_name("abc.png");
        assert_eq!(name, ".upload-abc.png.tmp");
        assert!(is_temp_upload_name(&name));
        assert!(!is_temp_upload_name("abc.png"));
    }

    #[test]
    fn guard_removes_file_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();

        let dropped = dir.path().join(temp_upload_name("a.png"));
        std::fs::write(&dropped, b"partial").unwrap();
        drop(TempFileGuard::new(dropped.clone()));
        assert!(!dropped.exists());

        let kept = dir.path().join(temp_upload_name("b.png"));
        std::fs::write(&kept, b"complete").unwrap();
        TempFileGuard::new(kept.clone()).disarm();
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn stale_uploads_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(temp_upload_name("a.png")), b"x").unwrap();
        std::fs::write(dir.path().join("keep.png"), b"x").unwrap();

        let removed = remove_stale_uploads(dir.path()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("keep.png").exists());
    }
}
