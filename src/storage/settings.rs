//! Storage settings
//!
//! Immutable values the storage gateway depends on. They are validated once
//! when built and never change for the lifetime of a `Storage`.

use std::collections::BTreeSet;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use crate::error::SettingsError;

/// Extensions that are refused even if a configuration lists them
pub const BLOCKED_EXTENSIONS: [&str; 9] = ["exe", "sh", "bat", "cmd", "com", "pif", "scr", "vbs", "js"];

pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum number of bytes a single uploaded file may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit(NonZeroU64);

impl SizeLimit {
    pub fn new(bytes: u64) -> Result<Self, SettingsError> {
        NonZeroU64::new(bytes)
            .map(SizeLimit)
            .ok_or(SettingsError::ZeroSizeLimit)
    }

    pub fn bytes(&self) -> u64 {
        self.0.get()
    }
}

/// Lower-case file extensions accepted for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExtensionSet {
    extensions: BTreeSet<String>,
}

impl AllowedExtensionSet {
    /// Build the set, normalizing each entry (`" .JPG"` becomes `"jpg"`).
    pub fn new<I, S>(extensions: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for raw in extensions {
            let raw = raw.as_ref();
            let ext = raw.trim();
            let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();

            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(SettingsError::InvalidExtension(raw.to_string()));
            }
            if BLOCKED_EXTENSIONS.contains(&ext.as_str()) {
                return Err(SettingsError::BlockedExtension(ext));
            }
            set.insert(ext);
        }

        if set.is_empty() {
            return Err(SettingsError::EmptyExtensionSet);
        }

        Ok(Self { extensions: set })
    }

    /// Case-insensitive membership test
    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Everything the storage gateway needs, fixed at startup
#[derive(Debug, Clone)]
pub struct StorageSettings {
    root: PathBuf,
    size_limit: SizeLimit,
    allowed_extensions: AllowedExtensionSet,
    buffer_size: usize,
}

impl StorageSettings {
    pub fn new(
        root: impl Into<PathBuf>,
        size_limit: SizeLimit,
        allowed_extensions: AllowedExtensionSet,
    ) -> Self {
        Self {
            root: root.into(),
            size_limit,
            allowed_extensions,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Override the chunk size used for streaming reads and writes
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Result<Self, SettingsError> {
        if buffer_size == 0 {
            return Err(SettingsError::ZeroBufferSize);
        }
        self.buffer_size = buffer_size;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn size_limit(&self) -> SizeLimit {
        self.size_limit
    }

    pub fn allowed_extensions(&self) -> &AllowedExtensionSet {
        &self.allowed_extensions
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalized() {
        let set = AllowedExtensionSet::new([" .JPG", "png", "Pdf"]).unwrap();
        let listed: Vec<&str> = set.iter().collect();
        assert_eq!(listed, vec!["jpg", "pdf", "png"]);
    }

    #[test]
    fn membership_is_case_insensitive() {
        let set = AllowedExtensionSet::new(["jpg"]).unwrap();
        assert!(set.contains("JPG"));
        assert!(set.contains("jpg"));
        assert!(!set.contains("jpeg"));
    }

    #[test]
    fn empty_set_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            AllowedExtensionSet::new(empty),
            Err(SettingsError::EmptyExtensionSet)
        ));
    }

    #[test]
    fn blocked_extensions_cannot_be_allowed() {
        assert!(matches!(
            AllowedExtensionSet::new(["png", "EXE"]),
            Err(SettingsError::BlockedExtension(ext)) if ext == "exe"
        ));
    }

    #[test]
    fn malformed_extensions_are_rejected() {
        assert!(matches!(
            AllowedExtensionSet::new(["tar.gz"]),
            Err(SettingsError::InvalidExtension(_))
        ));
        assert!(matches!(
            AllowedExtensionSet::new([""]),
            Err(SettingsError::InvalidExtension(_))
        ));
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(matches!(SizeLimit::new(0), Err(SettingsError::ZeroSizeLimit)));
        let settings = StorageSettings::new(
            "uploads",
            SizeLimit::new(1).unwrap(),
            AllowedExtensionSet::new(["png"]).unwrap(),
        );
        assert!(matches!(
            settings.with_buffer_size(0),
            Err(SettingsError::ZeroBufferSize)
        ));
    }
}
