// crates/centinel-core/src/lib.rs
//
// centinel-core: Core types, traits, and crypto primitives for the Centinel
// collector.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the chain hasher, the checkpoint and recovery data model, the
// error taxonomy, and the capability traits (object storage, live-state
// probe) the storage and recovery crates are written against.

pub mod canonical;
pub mod chain;
pub mod checkpoint;
pub mod crypto;
pub mod error;
pub mod recovery;
pub mod snapshot;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use centinel_core::CheckpointState;`

// Chain hashing
pub use chain::{chain_hash, chain_sequence, CHAIN_DOMAIN};

// Checkpoint types
pub use checkpoint::{
    validate_payload, ActaMarker, BatchCursor, CheckpointDraft, CheckpointEnvelope,
    CheckpointIdentity, CheckpointState, RuleState, ENVELOPE_SCHEMA_VERSION, RESERVED_STATE_KEYS,
};

// Recovery types
pub use recovery::{DecisionKind, RecoveryDecision, RecoveryState};

// Snapshot types
pub use snapshot::{ChainEntry, SnapshotMetadata, RESERVED_METADATA_KEYS};

// Crypto
pub use crypto::BaseKey;

// Error types
pub use error::{CentinelError, CheckpointError, StorageError};

// Traits
pub use traits::{ObjectStore, StateProbe};
