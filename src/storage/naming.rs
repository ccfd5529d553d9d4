//! Stored name generation
//!
//! On-disk names are a random 122-bit identifier plus the validated
//! extension. The client's claimed name never reaches the filesystem.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use uuid::{Builder, Uuid};

use crate::storage::validation::SafeBaseName;

/// Source of random identifiers for stored names
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Identifiers from the operating system's random source
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdSource;

impl IdSource for RandomIdSource {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic identifiers from a seeded generator
pub struct SeededIdSource {
    rng: Mutex<StdRng>,
}

impl SeededIdSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl IdSource for SeededIdSource {
    fn next_id(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(&mut bytes);
        Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Opaque on-disk file name, always a single path segment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoredName(String);

impl StoredName {
    /// Wrap a name found on disk that already passed `validate_stored_name`
    pub(crate) fn from_existing(name: &str) -> Self {
        StoredName(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Combines random identifiers with validated extensions
#[derive(Clone)]
pub struct UniqueNameGenerator {
    source: Arc<dyn IdSource>,
}

impl UniqueNameGenerator {
    pub fn new(source: Arc<dyn IdSource>) -> Self {
        Self { source }
    }

    pub fn generate(&self, base: &SafeBaseName) -> StoredName {
        let id = self.source.next_id();
        StoredName(format!("{}.{}", id.simple(), base.extension()))
    }
}

impl Default for UniqueNameGenerator {
    fn default() -> Self {
        Self::new(Arc::new(RandomIdSource))
    }
}

impl fmt::Debug for UniqueNameGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueNameGenerator").finish_non_exhaustive()
    }
}
