// crates/centinel-core/src/traits.rs

use async_trait::async_trait;

use crate::error::StorageError;
use crate::recovery::RecoveryState;

/// Minimal S3-style object store.
///
/// Implemented by centinel-store (opendal backend). Puts are whole-object:
/// readers never observe a partially written object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Read the object at `key`. A missing object is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// List keys directly under `prefix` (a `/`-terminated directory).
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Capability to observe the live data source during recovery.
///
/// Implemented by the host pipeline; the recovery engine only sees this
/// trait.
#[async_trait]
pub trait StateProbe: Send + Sync {
    async fn probe(&self) -> RecoveryState;
}
