//! Error taxonomy shared by every crate in this workspace.
//!
//! Mirrors the error kinds named in the external interface contract: a
//! request-facing caller needs a small, stable set of kinds it can map onto
//! HTTP status codes, while internals still get a full message and context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single required `(module, action)` permission pair, surfaced to the
/// caller on a permission failure so the client knows what it was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredPermission {
    pub module: String,
    pub action: String,
}

impl fmt::Display for RequiredPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

/// Engine-wide error type. Each variant corresponds to one row of the error
/// taxonomy; the HTTP layer maps these to status codes (validation->400,
/// authentication->401, permission->403, not_found->404, quota->429,
/// conflict->409, everything else->500).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("authentication failed")]
    Authentication(String),

    #[error("permission denied: requires {required}")]
    Permission { required: RequiredPermission },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("quota exceeded for {resource_kind}: {current}/{limit}")]
    QuotaExceeded {
        resource_kind: String,
        current: u64,
        limit: u64,
    },

    #[error("upstream failure ({source}): {message}")]
    UpstreamFailure { source: String, message: String },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn permission(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Permission {
            required: RequiredPermission {
                module: module.into(),
                action: action.into(),
            },
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn quota_exceeded(resource_kind: impl Into<String>, current: u64, limit: u64) -> Self {
        Self::QuotaExceeded {
            resource_kind: resource_kind.into(),
            current,
            limit,
        }
    }

    pub fn upstream(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamFailure {
            source: source.into(),
            message: message.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for the response envelope's `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Authentication(_) => "authentication_error",
            Error::Permission { .. } => "permission_denied",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::UpstreamFailure { .. } => "upstream_failure",
            Error::Timeout(_) => "timeout",
            Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code this error kind maps to, per the external interface.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Authentication(_) => 401,
            Error::Permission { .. } => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::QuotaExceeded { .. } => 429,
            Error::UpstreamFailure { .. } | Error::Timeout(_) | Error::Internal(_) => {
                if matches!(self, Error::Internal(_)) {
                    500
                } else {
                    502
                }
            }
        }
    }

    /// Whether the condition that produced this error is expected to clear
    /// on its own, i.e. a caller-visible retry makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpstreamFailure { .. } | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
