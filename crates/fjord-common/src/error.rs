//! Error types for the OpenFjord access layer

use thiserror::Error;

/// Access-layer error type
///
/// Every failure carries the offending identifier so callers can act on it
/// without parsing messages. None of these are recovered silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No credential was presented, or it matched nothing
    #[error("unauthenticated")]
    Unauthenticated,

    /// Credential valid but role insufficient, or an isolation check failed
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation referenced a nonexistent tenant or user
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of record was missing ("tenant", "user")
        kind: &'static str,
        /// The identifier that missed
        id: String,
    },

    /// Duplicate tenant/user id, or credential generation exhausted retries
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backing store unreachable during load/persist, after bounded retries
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Tenant deletion cleared the index but persisted cleanup partially
    /// failed; the caller should retry storage cleanup for this tenant
    #[error("partial cleanup for tenant {tenant_id}: {detail}")]
    PartialCleanup {
        /// Tenant whose persisted records need another cleanup pass
        tenant_id: String,
        /// What was left behind
        detail: String,
    },
}

impl AccessError {
    /// Shorthand for a missing tenant
    pub fn tenant_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "tenant", id: id.into() }
    }

    /// Shorthand for a missing user
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "user", id: id.into() }
    }
}

/// Result type for access-layer operations
pub type AccessResult<T> = Result<T, AccessError>;
