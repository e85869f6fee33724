//! Storage Isolation Layer
//!
//! Translates between the tenant-opaque logical addresses that clients see
//! and the tenant-prefixed physical paths the storage engine stores, and
//! filters results so a plain user only ever sees their own spaces. Holds no
//! per-request state: every call takes the acting [`RequestContext`], so one
//! instance is safely shared across all concurrent requests.

use crate::model::{RequestContext, Role};
use crate::space::{agent_space, is_space_segment, user_space};
use fjord_common::{AccessError, AccessResult};

/// First segment of every physical path
const DATA_ROOT: &str = "data";

/// Logical ↔ physical address mapping plus visibility checks
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMapper;

impl PathMapper {
    /// Create a mapper
    pub fn new() -> Self {
        Self
    }

    /// Physical path for a logical address: `data/<tenant>/<address>`
    ///
    /// The empty address maps to the tenant root itself.
    pub fn to_physical(&self, logical: &str, tenant_id: &str) -> String {
        let logical = normalize(logical);
        if logical.is_empty() {
            format!("{DATA_ROOT}/{tenant_id}")
        } else {
            format!("{DATA_ROOT}/{tenant_id}/{logical}")
        }
    }

    /// Logical address for a physical path: strips the fixed root and, if
    /// present, the leading tenant segment. True inverse of
    /// [`to_physical`](Self::to_physical) for all valid inputs.
    pub fn to_logical(&self, physical: &str, tenant_id: &str) -> String {
        let path = normalize(physical);
        let path = strip_segment(path, DATA_ROOT).unwrap_or(path);
        let path = strip_segment(path, tenant_id).unwrap_or(path);
        path.to_string()
    }

    /// Whether the caller may see this logical address
    ///
    /// Root and admin see everything within their tenant scope. A plain user
    /// traverses structural directories freely; any embedded space segment
    /// must be one of the caller's own derived spaces.
    pub fn is_accessible(&self, logical: &str, ctx: &RequestContext) -> bool {
        if matches!(ctx.role, Role::Root | Role::Admin) {
            return true;
        }
        let own_user_space = user_space(&ctx.user_id);
        let own_agent_space = agent_space(&ctx.user_id, &ctx.agent_id);
        normalize(logical)
            .split('/')
            .filter(|segment| is_space_segment(segment))
            .all(|segment| segment == own_user_space || segment == own_agent_space)
    }

    /// Drop every listing entry the caller may not see
    ///
    /// Applied after the backing store returns: nothing leaks past this
    /// filter regardless of what the store handed back.
    pub fn filter_listing(&self, entries: Vec<String>, ctx: &RequestContext) -> Vec<String> {
        entries
            .into_iter()
            .filter(|entry| self.is_accessible(entry, ctx))
            .collect()
    }

    /// Pre-flight check for mutating operations (read/write/create/delete/move)
    ///
    /// Must run before the storage engine is touched.
    pub fn check_access(&self, logical: &str, ctx: &RequestContext) -> AccessResult<()> {
        if self.is_accessible(logical, ctx) {
            Ok(())
        } else {
            Err(AccessError::PermissionDenied(format!(
                "address not accessible to user {}: {logical}",
                ctx.user_id
            )))
        }
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Strip a leading path segment only on a whole-segment boundary
fn strip_segment<'a>(path: &'a str, segment: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(segment)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}
