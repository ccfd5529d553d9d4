//! Error handlers
//!
//! Maps storage errors to protocol reply codes and logs them at the right level.

use crate::error::types::StorageError;
use crate::protocol::responses;
use log::{error, warn};

/// Log a storage error. `PathEscape` is an invariant failure and is always loud.
pub fn handle_error(err: &StorageError) {
    match err {
        StorageError::PathEscape(_) => error!("INVARIANT VIOLATION: {}", err),
        StorageError::StorageIo(_) => error!("Storage failure: {}", err),
        _ => warn!("Request rejected: {}", err),
    }
}

/// Convert a storage error to its reply code
pub fn error_to_reply_code(err: &StorageError) -> u16 {
    match err {
        StorageError::InvalidName(_) => responses::NAME_NOT_ALLOWED,
        StorageError::SizeExceeded { .. } => responses::SIZE_EXCEEDED,
        StorageError::PathEscape(_) => responses::ACCESS_DENIED,
        StorageError::NotFound(_) => responses::FILE_NOT_FOUND,
        StorageError::StorageIo(_) => responses::LOCAL_ERROR,
    }
}

/// Render an error as a complete reply line
pub fn error_to_reply(err: &StorageError) -> String {
    let message = match err {
        StorageError::InvalidName(reason) => format!("Invalid name ({})", reason.code()),
        StorageError::SizeExceeded { limit, .. } => {
            format!("File too large (maximum {} bytes)", limit)
        }
        StorageError::PathEscape(_) => "Access denied".to_string(),
        StorageError::NotFound(name) => format!("{}: File not found", name),
        StorageError::StorageIo(_) => "Requested action aborted: local error".to_string(),
    };
    responses::format_response(error_to_reply_code(err), &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NameRejection;
    use std::collections::HashSet;
    use std::io;
    use std::path::PathBuf;

    fn all_kinds() -> Vec<StorageError> {
        vec![
            StorageError::InvalidName(NameRejection::TraversalAttempt),
            StorageError::SizeExceeded { limit: 10, received: 11 },
            StorageError::PathEscape(PathBuf::from("/etc/passwd")),
            StorageError::NotFound("abc.jpg".into()),
            StorageError::StorageIo(io::Error::other("disk full")),
        ]
    }

    #[test]
    fn each_error_kind_has_a_distinct_code() {
        let codes: HashSet<u16> = all_kinds().iter().map(error_to_reply_code).collect();
        assert_eq!(codes.len(), 5);
    }

    #[test]
    fn replies_never_leak_resolved_paths() {
        let reply = error_to_reply(&StorageError::PathEscape(PathBuf::from("/etc/passwd")));
        assert_eq!(reply, "551 Access denied\r\n");
    }

    #[test]
    fn invalid_name_reply_carries_reason_code() {
        let reply = error_to_reply(&StorageError::InvalidName(NameRejection::DisallowedExtension));
        assert_eq!(reply, "553 Invalid name (DisallowedExtension)\r\n");
    }
}
