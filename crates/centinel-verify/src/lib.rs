// crates/centinel-verify/src/lib.rs
//
// centinel-verify: Offline auditor for Centinel snapshot trees.
//
// Walks `<root>/snapshots`, orders entries by their embedded timestamp and
// recomputes every chain hash. Used by the `centinel verify` command and by
// the live pipeline's self-checks.

pub mod entries;
pub mod verifier;

pub use entries::{collect_snapshot_entries, SnapshotEntry};
pub use verifier::{verify_entries, verify_hashchain, ChainIssue, ChainReport, Divergence, VerifyMode};
