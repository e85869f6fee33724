//! Shared types for OpenFjord
//!
//! The access layer's error taxonomy and the storage-backend abstraction
//! every other crate persists through.

#![warn(missing_docs)]

pub mod error;
pub mod storage;

pub use error::{AccessError, AccessResult};
pub use storage::{MemoryBackend, RetryPolicy, StorageBackend};
