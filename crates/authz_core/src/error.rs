use thiserror::Error;

use crate::types::{GroupId, Version};

pub type Result<T> = std::result::Result<T, AuthzError>;

/// Closed set of failure kinds. Callers branch on this rather than on
/// individual variants or messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    AlreadyExists,
    NoMatchingRecords,
    StorageUnavailable,
    InternalReadError,
    InvalidInput,
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid input: user is empty")]
    EmptyUser,

    #[error("invalid input: groups are not set")]
    NilGroups,

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("concurrency conflict: group {group_id} is no longer at version {expected_version}")]
    Concurrency {
        group_id: GroupId,
        expected_version: Version,
    },

    #[error("name already exists: {0}")]
    NameExists(String),

    #[error("no user records deleted for {0}")]
    NoUserRecordsDeleted(String),

    #[error("database error: {0}")]
    Database(anyhow::Error),

    #[error("failed to read policy: {0}")]
    Read(anyhow::Error),
}

impl AuthzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyUser | Self::NilGroups => ErrorKind::InvalidInput,
            Self::GroupNotFound(_) => ErrorKind::NotFound,
            Self::Concurrency { .. } => ErrorKind::Conflict,
            Self::NameExists(_) => ErrorKind::AlreadyExists,
            Self::NoUserRecordsDeleted(_) => ErrorKind::NoMatchingRecords,
            Self::Database(_) => ErrorKind::StorageUnavailable,
            Self::Read(_) => ErrorKind::InternalReadError,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound | ErrorKind::NoMatchingRecords => 404,
            ErrorKind::Conflict | ErrorKind::AlreadyExists => 409,
            ErrorKind::StorageUnavailable => 503,
            ErrorKind::InternalReadError => 500,
        }
    }

    /// True when re-reading the group version and reapplying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── kind: exhaustive variant coverage ─────────────────────────

    #[test]
    fn kind_invalid_input() {
        assert_eq!(AuthzError::EmptyUser.kind(), ErrorKind::InvalidInput);
        assert_eq!(AuthzError::NilGroups.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn kind_not_found() {
        assert_eq!(AuthzError::GroupNotFound(7).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn kind_conflict() {
        let err = AuthzError::Concurrency {
            group_id: 1,
            expected_version: 3,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn kind_already_exists() {
        assert_eq!(
            AuthzError::NameExists("admin".into()).kind(),
            ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn kind_no_matching_records() {
        assert_eq!(
            AuthzError::NoUserRecordsDeleted("ghost".into()).kind(),
            ErrorKind::NoMatchingRecords
        );
    }

    #[test]
    fn kind_storage_unavailable() {
        let err = AuthzError::Database(anyhow::anyhow!("connection reset"));
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn kind_internal_read_error() {
        let err = AuthzError::Read(anyhow::anyhow!("bad column"));
        assert_eq!(err.kind(), ErrorKind::InternalReadError);
    }

    // ── http_status ──────────────────────────────────────────────

    #[test]
    fn http_status_mapping() {
        assert_eq!(AuthzError::EmptyUser.http_status(), 400);
        assert_eq!(AuthzError::GroupNotFound(1).http_status(), 404);
        assert_eq!(AuthzError::NoUserRecordsDeleted("u".into()).http_status(), 404);
        assert_eq!(AuthzError::NameExists("g".into()).http_status(), 409);
        assert_eq!(
            AuthzError::Concurrency {
                group_id: 1,
                expected_version: 1
            }
            .http_status(),
            409
        );
        assert_eq!(
            AuthzError::Database(anyhow::anyhow!("down")).http_status(),
            503
        );
        assert_eq!(AuthzError::Read(anyhow::anyhow!("eof")).http_status(), 500);
    }

    // ── Display ──────────────────────────────────────────────────

    #[test]
    fn display_group_not_found() {
        assert_eq!(
            AuthzError::GroupNotFound(42).to_string(),
            "group not found: 42"
        );
    }

    #[test]
    fn display_concurrency() {
        let err = AuthzError::Concurrency {
            group_id: 5,
            expected_version: 2,
        };
        assert_eq!(
            err.to_string(),
            "concurrency conflict: group 5 is no longer at version 2"
        );
    }

    #[test]
    fn display_database_includes_source() {
        let err = AuthzError::Database(anyhow::anyhow!("pool timed out"));
        assert_eq!(err.to_string(), "database error: pool timed out");
    }
}
