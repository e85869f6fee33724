//! Key Registry Store
//!
//! Persistence adapter for the manager's tenant list and per-tenant user
//! tables. Everything is flat, human-inspectable JSON behind the external
//! storage engine's get/put/delete contract:
//!
//! - `registry/tenants.json`: tenant id → metadata
//! - `registry/accounts/<tenant>.json`: user id → { role, api_key }

use crate::model::UserRecord;
use fjord_common::{AccessError, AccessResult, RetryPolicy, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const TENANT_LIST_PATH: &str = "registry/tenants.json";

fn user_table_path(tenant_id: &str) -> String {
    format!("registry/accounts/{tenant_id}.json")
}

/// Persisted per-tenant metadata in the global tenant list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantMeta {
    /// Creation time, unix seconds
    pub created_at: u64,
}

/// Global tenant list as persisted
pub type TenantList = BTreeMap<String, TenantMeta>;
/// Per-tenant user table as persisted
pub type UserTable = BTreeMap<String, UserRecord>;

/// Reads and writes the registry records through a [`StorageBackend`]
pub struct KeyRegistryStore {
    backend: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
}

impl KeyRegistryStore {
    /// Create a store over the given backend
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend, retry: RetryPolicy::default() }
    }

    /// Override the retry policy applied to backend calls
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load the global tenant list; `None` on first boot (no record yet)
    pub async fn load_tenant_list(&self) -> AccessResult<Option<TenantList>> {
        let bytes = match self.retry.run(|| self.backend.get(TENANT_LIST_PATH)).await {
            Ok(bytes) => bytes,
            Err(AccessError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let list = serde_json::from_slice(&bytes).map_err(|e| {
            AccessError::StorageUnavailable(format!("corrupt tenant list: {e}"))
        })?;
        Ok(Some(list))
    }

    /// Persist the global tenant list
    pub async fn save_tenant_list(&self, list: &TenantList) -> AccessResult<()> {
        let bytes = encode(list)?;
        self.retry.run(|| self.backend.put(TENANT_LIST_PATH, bytes.clone())).await
    }

    /// Load one tenant's user table; a listed tenant with no table yet is empty
    pub async fn load_user_table(&self, tenant_id: &str) -> AccessResult<UserTable> {
        let path = user_table_path(tenant_id);
        match self.retry.run(|| self.backend.get(&path)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AccessError::StorageUnavailable(format!(
                    "corrupt user table for tenant {tenant_id}: {e}"
                ))
            }),
            Err(AccessError::NotFound { .. }) => {
                tracing::warn!(tenant_id, "tenant listed but user table missing, treating as empty");
                Ok(UserTable::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist one tenant's user table
    pub async fn save_user_table(&self, tenant_id: &str, table: &UserTable) -> AccessResult<()> {
        let path = user_table_path(tenant_id);
        let bytes = encode(table)?;
        self.retry.run(|| self.backend.put(&path, bytes.clone())).await
    }

    /// Delete one tenant's user table record
    pub async fn delete_user_table(&self, tenant_id: &str) -> AccessResult<()> {
        let path = user_table_path(tenant_id);
        self.retry.run(|| self.backend.delete(&path)).await
    }
}

fn encode<T: Serialize>(value: &T) -> AccessResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| AccessError::StorageUnavailable(format!("encode failed: {e}")))
}
