//! File storage management
//!
//! Name sanitization, stored-name generation and the storage gateway that
//! owns every file under the storage root.

pub mod filesystem;
pub mod naming;
pub mod operations;
pub mod results;
pub mod settings;
pub mod validation;

// Re-export the types callers work with
pub use naming::{IdSource, RandomIdSource, SeededIdSource, StoredName, UniqueNameGenerator};
pub use operations::Storage;
pub use results::{StoredFile, StoredFileStream};
pub use settings::{AllowedExtensionSet, SizeLimit, StorageSettings};
pub use validation::{SafeBaseName, sanitize, validate_stored_name};
