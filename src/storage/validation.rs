//! Path validation
//!
//! Turns untrusted names into safe ones and checks that every resolved path
//! stays inside the storage root.

use std::path::{Component, Path, PathBuf};

use log::error;

use crate::error::{NameRejection, StorageError};
use crate::storage::settings::AllowedExtensionSet;

/// Longest name accepted, in bytes (common filesystem limit)
pub const MAX_NAME_LENGTH: usize = 255;

const SAFE_PUNCTUATION: &str = " -_.()+,@~[]";

/// An upload name that passed sanitization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeBaseName {
    name: String,
    extension: String,
}

impl SafeBaseName {
    /// The final path segment of the claimed name, trimmed
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-cased extension, guaranteed to be in the allow-list
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_alphanumeric() || SAFE_PUNCTUATION.contains(c)
}

fn is_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    raw.starts_with('/')
        || raw.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Sanitize a client-supplied upload name.
///
/// Rejects traversal and absolute names outright, keeps only the final path
/// segment of anything else, then checks characters and the extension.
pub fn sanitize(raw: &str, allowed: &AllowedExtensionSet) -> Result<SafeBaseName, NameRejection> {
    if raw.contains('\0') {
        return Err(NameRejection::InvalidCharacters);
    }

    if is_absolute(raw) || raw.split(['/', '\\']).any(|segment| segment.trim() == "..") {
        return Err(NameRejection::TraversalAttempt);
    }

    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();

    if base.is_empty() {
        return Err(NameRejection::EmptyName);
    }
    if base.chars().all(|c| c == '.') {
        return Err(NameRejection::TraversalAttempt);
    }
    if base.len() > MAX_NAME_LENGTH {
        return Err(NameRejection::NameTooLong);
    }
    if !base.chars().all(is_safe_char) {
        return Err(NameRejection::InvalidCharacters);
    }

    let (stem, ext) = base
        .rsplit_once('.')
        .ok_or(NameRejection::DisallowedExtension)?;

    if stem.chars().all(|c| c == '.') {
        return Err(NameRejection::EmptyName);
    }
    if ext.is_empty() || !allowed.contains(ext) {
        return Err(NameRejection::DisallowedExtension);
    }

    Ok(SafeBaseName {
        name: base.to_string(),
        extension: ext.to_ascii_lowercase(),
    })
}

/// Validate a name that should refer to an already stored file.
///
/// Stored names are single path segments; nothing here is stripped or
/// rewritten, anything suspicious is refused.
pub fn validate_stored_name(name: &str) -> Result<&str, NameRejection> {
    if name.is_empty() {
        return Err(NameRejection::EmptyName);
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(NameRejection::TraversalAttempt);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameRejection::NameTooLong);
    }
    if name.starts_with('.') || !name.chars().all(is_safe_char) {
        return Err(NameRejection::InvalidCharacters);
    }
    Ok(name)
}

/// Join a single-segment name onto the canonical root for a file that does
/// not exist yet. The result must be a direct child of `root`.
pub fn resolve_new_path(root: &Path, name: &str) -> Result<PathBuf, StorageError> {
    let candidate = root.join(name);

    let mut components = Path::new(name).components();
    let single_segment = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if !single_segment || candidate.parent() != Some(root) {
        error!(
            "Path containment violated: {:?} resolved to {} outside {}",
            name,
            candidate.display(),
            root.display()
        );
        return Err(StorageError::PathEscape(candidate));
    }

    Ok(candidate)
}

/// Check that a canonicalized path is a strict descendant of the canonical root.
pub fn ensure_contained(root: &Path, canonical: &Path) -> Result<(), StorageError> {
    if canonical.starts_with(root) && canonical != root {
        return Ok(());
    }

    error!(
        "Path containment violated: {} is outside {}",
        canonical.display(),
        root.display()
    );
    Err(StorageError::PathEscape(canonical.to_path_buf()))
}
