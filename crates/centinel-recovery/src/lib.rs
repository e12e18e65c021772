// crates/centinel-recovery/src/lib.rs
//
// centinel-recovery: Recovery Decision Engine for the Centinel collector.
//
// On startup the engine walks the available checkpoints (local directory or
// encrypted object store), validates them, optionally cross-checks a live
// state probe, and returns exactly one RecoveryDecision. Errors never escape:
// every failure becomes a decision.

pub mod engine;
pub mod local;
pub mod policy;
pub mod remote;
pub mod source;

// Engine
pub use engine::RecoveryEngine;
pub use policy::{RecoverySettings, StalePolicy};

// Sources
pub use local::LocalCheckpointDir;
pub use remote::EncryptedCheckpointSource;
pub use source::{CheckpointCandidate, CheckpointRecord, CheckpointSource, LoadOutcome, LoadedCheckpoint};
