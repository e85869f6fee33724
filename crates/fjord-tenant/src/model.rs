//! Identity Data Model

use fjord_common::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Fixed tenant id used for root and development identities
pub const DEFAULT_TENANT: &str = "default";
/// Fixed user id used for root and development identities
pub const DEFAULT_USER: &str = "default";
/// Agent id filled in when the caller supplied none
pub const DEFAULT_AGENT: &str = "default";

/// Maximum length of a tenant or user id
pub const MAX_ID_LEN: usize = 64;

/// Role attached to an identity
///
/// Root is matched out of band against the configured root credential and is
/// never stored in a user record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged system identity, unrestricted access
    Root,
    /// Tenant administrator, sees everything within the tenant
    Admin,
    /// Plain user, confined to their own user/agent spaces
    User,
}

impl Role {
    /// Roles that may be assigned to a tenant user
    pub fn assignable(&self) -> bool {
        !matches!(self, Role::Root)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Root => "root",
            Role::Admin => "admin",
            Role::User => "user",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Role::Root),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(AccessError::Conflict(format!("unknown role: {other}"))),
        }
    }
}

/// Transient result of credential resolution
///
/// Root carries no tenant/user; per-tenant identities carry both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Resolved role
    pub role: Role,
    /// Tenant the credential belongs to, absent for root
    pub tenant_id: Option<String>,
    /// User the credential belongs to, absent for root
    pub user_id: Option<String>,
}

impl ResolvedIdentity {
    /// The root identity
    pub fn root() -> Self {
        Self { role: Role::Root, tenant_id: None, user_id: None }
    }

    /// A per-tenant identity
    pub fn member(tenant_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self { role, tenant_id: Some(tenant_id.into()), user_id: Some(user_id.into()) }
    }
}

/// The canonical identity passed through every downstream operation
///
/// Always fully populated: root identities get the fixed defaults, so no
/// consumer ever branches on a missing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Acting tenant
    pub tenant_id: String,
    /// Acting user
    pub user_id: String,
    /// Acting agent within the user's session
    pub agent_id: String,
    /// Acting role
    pub role: Role,
}

impl RequestContext {
    /// Build a context from a resolved identity, defaulting missing fields
    pub fn from_identity(identity: &ResolvedIdentity, agent_id: Option<&str>) -> Self {
        Self {
            tenant_id: identity.tenant_id.clone().unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            user_id: identity.user_id.clone().unwrap_or_else(|| DEFAULT_USER.to_string()),
            agent_id: agent_id.unwrap_or(DEFAULT_AGENT).to_string(),
            role: identity.role,
        }
    }

    /// The caller's user/agent pair, for space derivation
    ///
    /// The default agent collapses to a user-scoped identifier so that
    /// writes made outside any named agent land in the user space.
    pub fn user_identifier(&self) -> UserIdentifier {
        let agent_id = if self.agent_id == DEFAULT_AGENT {
            None
        } else {
            Some(self.agent_id.clone())
        };
        UserIdentifier { user_id: self.user_id.clone(), agent_id }
    }
}

/// A user id with an optional agent id, the input to space derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentifier {
    /// User id, unique within its tenant
    pub user_id: String,
    /// Agent id, when the caller acts through a named agent
    pub agent_id: Option<String>,
}

/// Persisted user entry in a tenant's user table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    /// Assigned role (`admin` or `user`)
    pub role: Role,
    /// The user's single live credential
    pub api_key: String,
}

/// Persisted tenant record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantRecord {
    /// Immutable tenant id, doubles as the storage-path segment
    pub tenant_id: String,
    /// Creation time, unix seconds
    pub created_at: u64,
    /// User table: user id → record
    pub users: BTreeMap<String, UserRecord>,
}

impl TenantRecord {
    /// Fresh tenant with no users
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into(), created_at: now(), users: BTreeMap::new() }
    }
}

/// Tenant listing entry exposed to management callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantSummary {
    /// Tenant id
    pub tenant_id: String,
    /// Creation time, unix seconds
    pub created_at: u64,
    /// Number of registered users
    pub user_count: usize,
}

/// User listing entry exposed to management callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    /// User id
    pub user_id: String,
    /// Assigned role
    pub role: Role,
}

/// Validate a tenant or user id: non-empty, bounded, `[a-z0-9_-]` only
pub fn validate_id(kind: &str, id: &str) -> AccessResult<()> {
    if id.is_empty() {
        return Err(AccessError::Conflict(format!("{kind} id must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(AccessError::Conflict(format!(
            "{kind} id exceeds {MAX_ID_LEN} characters: {id}"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(AccessError::Conflict(format!(
            "{kind} id contains invalid characters: {id}"
        )));
    }
    Ok(())
}

pub(crate) fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("root".parse::<Role>().unwrap(), Role::Root);
        assert!("superuser".parse::<Role>().is_err());
        assert!(!Role::Root.assignable());
        assert!(Role::Admin.assignable());
    }

    #[test]
    fn test_context_fills_defaults_for_root() {
        let ctx = RequestContext::from_identity(&ResolvedIdentity::root(), None);
        assert_eq!(ctx.tenant_id, DEFAULT_TENANT);
        assert_eq!(ctx.user_id, DEFAULT_USER);
        assert_eq!(ctx.agent_id, DEFAULT_AGENT);
        assert_eq!(ctx.role, Role::Root);
    }

    #[test]
    fn test_context_passes_through_member_identity() {
        let identity = ResolvedIdentity::member("acme", "alice", Role::Admin);
        let ctx = RequestContext::from_identity(&identity, Some("coder"));
        assert_eq!(ctx.tenant_id, "acme");
        assert_eq!(ctx.user_id, "alice");
        assert_eq!(ctx.agent_id, "coder");
    }

    #[test]
    fn test_id_validation() {
        assert!(validate_id("tenant", "acme").is_ok());
        assert!(validate_id("tenant", "acme-corp_01").is_ok());
        assert!(validate_id("tenant", "").is_err());
        assert!(validate_id("tenant", "Acme").is_err());
        assert!(validate_id("tenant", "a/b").is_err());
        assert!(validate_id("tenant", &"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_user_table_serializes_flat() {
        let mut tenant = TenantRecord::new("acme");
        tenant
            .users
            .insert("alice".into(), UserRecord { role: Role::Admin, api_key: "k1".into() });

        let json = serde_json::to_string(&tenant).unwrap();
        assert!(json.contains("\"alice\""));
        assert!(json.contains("\"admin\""));

        let back: TenantRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tenant);
    }
}
