// crates/centinel-store/src/lib.rs
//
// centinel-store: Persistence for the Centinel collector.
//
// Two independent halves:
// - Snapshot Store and hash ledger on the local filesystem (tamper-evident
//   record of every collected artifact).
// - Encrypted Checkpoint Store on an S3-compatible object store via opendal,
//   fronted by a bounded, retrying storage executor.

pub mod checkpoint;
pub mod fsutil;
pub mod ledger;
pub mod object;
pub mod retry;
pub mod snapshot;

// Checkpoints
pub use checkpoint::{EncryptedCheckpointStore, HISTORY_LIMIT, LATEST_OBJECT};

// Object storage
pub use object::{OpendalStore, S3Settings};
pub use retry::{RetryPolicy, StorageExecutor};

// Snapshots
pub use ledger::HashLedger;
pub use snapshot::{SnapshotRecord, SnapshotRequest, SnapshotStore};
