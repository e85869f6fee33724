//! Query Filter Builder
//!
//! Constructs the tenant/ownership predicate injected into every
//! vector-search query. The predicate is opaque JSON handed to the query
//! engine verbatim; this module only guarantees its shape matches the tags
//! stamped on records at ingestion time.

use crate::model::{RequestContext, Role};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Ownership tag stamped on every record written through the ingestion path
///
/// The owner space is fixed at creation time and never altered by later
/// sharing operations, so historical records stay queryable under the same
/// predicate shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerTag {
    /// Writing tenant
    pub tenant_id: String,
    /// Writer's space at the time of the write
    pub owner_space: String,
}

impl OwnerTag {
    /// Tag for a record the caller is about to write
    pub fn for_write(ctx: &RequestContext) -> Self {
        Self {
            tenant_id: ctx.tenant_id.clone(),
            owner_space: ctx.user_identifier().space(),
        }
    }
}

/// Build the predicate for a similarity query on behalf of `ctx`
///
/// Root queries are unrestricted (`None`). Admin queries are pinned to the
/// tenant. User queries are pinned to the tenant AND to the caller's own
/// user or agent space.
pub fn build_filter(ctx: &RequestContext) -> Option<Value> {
    match ctx.role {
        Role::Root => None,
        Role::Admin => Some(json!({
            "tenant_id": { "$eq": ctx.tenant_id }
        })),
        Role::User => {
            let id = ctx.user_identifier();
            let user_space = crate::space::user_space(&id.user_id);
            let agent_space =
                crate::space::agent_space(&id.user_id, ctx.agent_id.as_str());
            Some(json!({
                "$and": [
                    { "tenant_id": { "$eq": ctx.tenant_id } },
                    { "owner_space": { "$in": [user_space, agent_space] } },
                ]
            }))
        }
    }
}
