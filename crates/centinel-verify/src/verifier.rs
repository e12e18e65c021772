// crates/centinel-verify/src/verifier.rs
//
// verify_hashchain: recompute every snapshot's chain hash and compare it to
// the stored `hash.txt`.
//
// Two ways to pick the previous hash for entry i > 0:
//   Stored  - entry i-1's stored hash. Each entry is checked on its own, so
//             tampering at k is reported at k only.
//   Rechain - entry i-1's recomputed hash, as a pipeline continuing from the
//             tampered value would. Tampering at k also surfaces as a
//             previous_hash mismatch at k+1.
// Entry 0, and any entry after an unreadable one, uses the previous hash its
// own metadata claims.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use centinel_core::error::CentinelError;

use crate::entries::{collect_snapshot_entries, SnapshotEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    #[default]
    Stored,
    Rechain,
}

/// A single problem found in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    HashMismatch {
        index: usize,
        path: String,
        stored: String,
        computed: String,
    },
    PreviousHashMismatch {
        index: usize,
        path: String,
        expected: String,
        claimed: Option<String>,
    },
    MissingTimestamp {
        index: usize,
        path: String,
    },
    Unreadable {
        index: usize,
        path: String,
        reason: String,
    },
}

impl ChainIssue {
    pub fn index(&self) -> usize {
        match self {
            ChainIssue::HashMismatch { index, .. }
            | ChainIssue::PreviousHashMismatch { index, .. }
            | ChainIssue::MissingTimestamp { index, .. }
            | ChainIssue::Unreadable { index, .. } => *index,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ChainIssue::HashMismatch { path, .. }
            | ChainIssue::PreviousHashMismatch { path, .. }
            | ChainIssue::MissingTimestamp { path, .. }
            | ChainIssue::Unreadable { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub index: usize,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub count: usize,
    /// Stored hash of the newest readable entry.
    pub last_hash: Option<String>,
    pub issues: Vec<ChainIssue>,
    pub first_divergence: Option<Divergence>,
}

/// Verify every snapshot under `root`.
pub fn verify_hashchain(root: &Path, mode: VerifyMode) -> Result<ChainReport, CentinelError> {
    let entries = collect_snapshot_entries(root)?;
    Ok(verify_entries(&entries, mode))
}

/// Verify an already-ordered entry list.
pub fn verify_entries(entries: &[SnapshotEntry], mode: VerifyMode) -> ChainReport {
    let mut issues = Vec::new();
    let mut last_hash = None;
    // (stored, computed) hash of the previous readable entry.
    let mut previous: Option<(String, String)> = None;

    for (index, entry) in entries.iter().enumerate() {
        let path = entry.relative.clone();
        if entry.timestamp.is_none() {
            issues.push(ChainIssue::MissingTimestamp {
                index,
                path: path.clone(),
            });
        }

        let loaded = entry.read_metadata().and_then(|meta| {
            let content = fs::read(entry.raw_path())?;
            let stored = entry.read_stored_hash()?;
            Ok((meta, content, stored))
        });
        let (meta, content, stored) = match loaded {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Snapshot entry unreadable");
                issues.push(ChainIssue::Unreadable {
                    index,
                    path,
                    reason: e.to_string(),
                });
                previous = None;
                continue;
            }
        };

        let expected_prev = match (&previous, mode) {
            (Some((stored_prev, _)), VerifyMode::Stored) => Some(stored_prev.clone()),
            (Some((_, computed_prev)), VerifyMode::Rechain) => Some(computed_prev.clone()),
            (None, _) => meta.previous_hash.clone(),
        };

        if let Some(expected) = &expected_prev {
            if meta.previous_hash.as_deref() != Some(expected.as_str()) {
                issues.push(ChainIssue::PreviousHashMismatch {
                    index,
                    path: path.clone(),
                    expected: expected.clone(),
                    claimed: meta.previous_hash.clone(),
                });
            }
        }

        let computed = match meta.chain_hash(&content, expected_prev.as_deref()) {
            Ok(hash) => hash,
            Err(e) => {
                issues.push(ChainIssue::Unreadable {
                    index,
                    path,
                    reason: e.to_string(),
                });
                previous = None;
                continue;
            }
        };

        if computed != stored {
            issues.push(ChainIssue::HashMismatch {
                index,
                path,
                stored: stored.clone(),
                computed: computed.clone(),
            });
        }

        last_hash = Some(stored.clone());
        previous = Some((stored, computed));
    }

    let first_divergence = issues
        .iter()
        .filter(|issue| !matches!(issue, ChainIssue::MissingTimestamp { .. }))
        .min_by_key(|issue| issue.index())
        .map(|issue| Divergence {
            index: issue.index(),
            path: issue.path().to_string(),
        });

    let report = ChainReport {
        valid: issues.is_empty(),
        count: entries.len(),
        last_hash,
        issues,
        first_divergence,
    };
    if report.valid {
        tracing::info!(count = report.count, "Hash chain verified");
    } else {
        tracing::warn!(
            count = report.count,
            issues = report.issues.len(),
            "Hash chain verification failed"
        );
    }
    report
}
