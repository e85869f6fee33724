//! Space derivation
//!
//! Storage paths and vector-index ownership tags never carry raw user or
//! agent ids. They carry a "space": a deterministic short hash of the id(s),
//! so physical layouts stay stable while ids stay private. Pure functions,
//! no stored state.

use crate::model::UserIdentifier;
use sha2::{Digest, Sha256};

/// Prefix of user-scoped space segments
const USER_SPACE_PREFIX: &str = "us-";
/// Prefix of user+agent-scoped space segments
const AGENT_SPACE_PREFIX: &str = "as-";
/// Hex chars kept from the digest
const SPACE_HASH_LEN: usize = 16;

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..SPACE_HASH_LEN].to_string()
}

/// Space scoped to a user: `us-<hash16(user_id)>`
pub fn user_space(user_id: &str) -> String {
    format!("{USER_SPACE_PREFIX}{}", short_hash(user_id))
}

/// Space scoped to a user+agent pair: `as-<hash16(user_id:agent_id)>`
pub fn agent_space(user_id: &str, agent_id: &str) -> String {
    format!("{AGENT_SPACE_PREFIX}{}", short_hash(&format!("{user_id}:{agent_id}")))
}

/// True if a path segment has the shape of a derived space
pub fn is_space_segment(segment: &str) -> bool {
    let hash = match segment
        .strip_prefix(USER_SPACE_PREFIX)
        .or_else(|| segment.strip_prefix(AGENT_SPACE_PREFIX))
    {
        Some(h) => h,
        None => return false,
    };
    hash.len() == SPACE_HASH_LEN && hash.chars().all(|c| c.is_ascii_hexdigit())
}

impl UserIdentifier {
    /// Derive the space for this identifier: agent space when an agent id is
    /// present, user space otherwise
    pub fn space(&self) -> String {
        match &self.agent_id {
            Some(agent) => agent_space(&self.user_id, agent),
            None => user_space(&self.user_id),
        }
    }
}
