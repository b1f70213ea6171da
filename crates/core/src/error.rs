//! Error types for the ledger

use thiserror::Error;

/// Coarse classification of an [`Error`], used by callers to decide how to
/// surface a failure (client mistake, missing record, quota, permission or
/// storage trouble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    QuotaExceeded,
    Forbidden,
    Persistence,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid credit type: {0}")]
    InvalidCreditType(String),

    #[error("Invalid amount: {0}, must be a positive integer")]
    InvalidAmount(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Member {user_id} not found in organization {org_id}")]
    MemberNotFound { org_id: String, user_id: String },

    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("Member is blocked by admin")]
    MemberBlocked,

    #[error("Member limit exceeded: {remaining} remaining, {requested} requested")]
    MemberLimitExceeded { remaining: i64, requested: i64 },

    #[error("Insufficient organization credits: {remaining} remaining, {requested} requested")]
    OrganizationLimitExceeded { remaining: i64, requested: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCreditType(_) | Self::InvalidAmount(_) | Self::InvalidInput(_) => {
                ErrorKind::Validation
            }
            Self::MemberNotFound { .. } | Self::OrganizationNotFound(_) => ErrorKind::NotFound,
            Self::MemberLimitExceeded { .. } | Self::OrganizationLimitExceeded { .. } => {
                ErrorKind::QuotaExceeded
            }
            Self::MemberBlocked | Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Io(_) | Self::Serialization(_) | Self::Storage(_) => ErrorKind::Persistence,
        }
    }

    /// Whether repeating the same request could succeed without any change
    /// in balance or permissions.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Persistence
    }

    /// Remaining balance carried by quota rejections.
    pub fn remaining(&self) -> Option<i64> {
        match self {
            Self::MemberLimitExceeded { remaining, .. }
            | Self::OrganizationLimitExceeded { remaining, .. } => Some(*remaining),
            _ => None,
        }
    }

    pub fn requested(&self) -> Option<i64> {
        match self {
            Self::MemberLimitExceeded { requested, .. }
            | Self::OrganizationLimitExceeded { requested, .. } => Some(*requested),
            _ => None,
        }
    }
}
