//! Identity Resolver & RBAC Guard
//!
//! Front door of the access layer: extracts a credential from the inbound
//! request, resolves it through the [`ApiKeyManager`], and hands the rest of
//! the system a fully-populated [`RequestContext`]. Resolution has four
//! terminal states (no credential, root match, index match, unmatched) and
//! never retries; it is a pure function of the current index snapshot.

use crate::manager::ApiKeyManager;
use crate::model::{RequestContext, ResolvedIdentity, Role, DEFAULT_TENANT, DEFAULT_USER};
use fjord_common::{AccessError, AccessResult};
use std::sync::Arc;

/// Resolves inbound credentials into request contexts
pub struct IdentityResolver {
    manager: Arc<ApiKeyManager>,
    /// Agent assumed when the request names none, from `AuthConfig`
    default_agent_id: Option<String>,
}

impl IdentityResolver {
    /// Create a resolver over the shared manager
    pub fn new(manager: Arc<ApiKeyManager>) -> Self {
        Self { manager, default_agent_id: None }
    }

    /// Set the configured fallback agent (`AuthConfig.default_agent_id`)
    pub fn with_default_agent(mut self, agent_id: Option<String>) -> Self {
        self.default_agent_id = agent_id;
        self
    }

    /// Resolve an optional credential into an identity
    ///
    /// When no root credential is configured anywhere, authentication is
    /// disabled: every request short-circuits into the fixed development
    /// identity without consulting the manager. This path is unreachable
    /// once a root credential is configured.
    pub fn resolve_identity(&self, credential: Option<&str>) -> AccessResult<ResolvedIdentity> {
        if !self.manager.root_key_configured() {
            return Ok(development_identity());
        }
        match credential {
            None => Err(AccessError::Unauthenticated),
            Some(c) => self.manager.resolve(c),
        }
    }

    /// Build the canonical context for a resolved identity
    ///
    /// Agent fallback order: caller-supplied, then the configured default
    /// agent, then the fixed `default`.
    pub fn request_context(
        &self,
        identity: &ResolvedIdentity,
        agent_id: Option<&str>,
    ) -> RequestContext {
        let agent_id = agent_id.or(self.default_agent_id.as_deref());
        RequestContext::from_identity(identity, agent_id)
    }

    /// Resolve and contextualize in one step
    pub fn authenticate(
        &self,
        credential: Option<&str>,
        agent_id: Option<&str>,
    ) -> AccessResult<RequestContext> {
        let identity = self.resolve_identity(credential)?;
        Ok(self.request_context(&identity, agent_id))
    }
}

/// The identity used when authentication is disabled (single-tenant/local)
fn development_identity() -> ResolvedIdentity {
    ResolvedIdentity {
        role: Role::Root,
        tenant_id: Some(DEFAULT_TENANT.to_string()),
        user_id: Some(DEFAULT_USER.to_string()),
    }
}

/// Allow-list role check applied before a handler runs
///
/// Guards compose by conjunction: run each guard's [`check`](Self::check) in
/// turn and the first refusal wins.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    allowed: Vec<Role>,
}

impl RoleGuard {
    /// Guard allowing exactly these roles
    pub fn allow(roles: &[Role]) -> Self {
        Self { allowed: roles.to_vec() }
    }

    /// Management operations: root only
    pub fn root_only() -> Self {
        Self::allow(&[Role::Root])
    }

    /// Tenant administration: root or tenant admin
    pub fn admin() -> Self {
        Self::allow(&[Role::Root, Role::Admin])
    }

    /// Any authenticated identity
    pub fn any() -> Self {
        Self::allow(&[Role::Root, Role::Admin, Role::User])
    }

    /// Accept or reject the context
    pub fn check(&self, ctx: &RequestContext) -> AccessResult<()> {
        if self.allowed.contains(&ctx.role) {
            Ok(())
        } else {
            Err(AccessError::PermissionDenied(format!(
                "role {} not allowed for this operation",
                ctx.role
            )))
        }
    }
}
