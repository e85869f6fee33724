//! Multi-Tenant Access Layer
//!
//! Resolves opaque API keys into tenant/user/role identities, enforces
//! role-based access, and partitions file storage and vector-index queries
//! per tenant and per user.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    MULTI-TENANT ACCESS LAYER                     │
//! │                                                                  │
//! │  inbound credential                                              │
//! │        │                                                         │
//! │  ┌─────▼──────────┐     ┌────────────────┐                       │
//! │  │ IdentityResolver│────▶│ ApiKeyManager  │  key → (tenant,      │
//! │  └─────┬──────────┘     │ in-memory index│   user, role)        │
//! │        │                └───────┬────────┘                       │
//! │  ┌─────▼──────┐                 │ persist                        │
//! │  │ RoleGuard  │         ┌───────▼────────┐                       │
//! │  └─────┬──────┘         │ KeyRegistryStore│ → StorageBackend     │
//! │        │                └────────────────┘                       │
//! │  ┌─────▼──────────────────────────────────────────┐              │
//! │  │ RequestContext → PathMapper / QueryFilterBuilder│              │
//! │  │   data/<tenant>/... paths, owner-space filters  │              │
//! │  └─────────────────────────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod filter;
pub mod isolation;
pub mod manager;
pub mod model;
pub mod resolver;
pub mod space;
pub mod store;

pub use config::{AuthConfig, ConfigError};
pub use filter::{build_filter, OwnerTag};
pub use isolation::PathMapper;
pub use manager::ApiKeyManager;
pub use model::{RequestContext, ResolvedIdentity, Role, UserIdentifier};
pub use resolver::{IdentityResolver, RoleGuard};
