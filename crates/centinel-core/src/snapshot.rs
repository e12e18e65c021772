// crates/centinel-core/src/snapshot.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_json;
use crate::chain::chain_hash;
use crate::error::CentinelError;

/// Snapshot tree layout shared by the writer and the auditor:
/// `<root>/snapshots/<YYYY>/<MM>/<DD>/<HH-MM-SS>/{raw, metadata, hash}`.
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const RAW_FILE: &str = "snapshot.raw";
pub const METADATA_FILE: &str = "snapshot.metadata.json";
pub const HASH_FILE: &str = "hash.txt";

/// Typed metadata fields; `extra` may not reuse these names.
pub const RESERVED_METADATA_KEYS: [&str; 4] =
    ["source_url", "timestamp_utc", "software_version", "previous_hash"];

/// Per-artifact record stored next to `snapshot.raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub source_url: String,
    pub timestamp_utc: String,
    pub software_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// Artifact-specific fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SnapshotMetadata {
    /// Canonical bytes fed into the chain hash.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CentinelError> {
        self.ensure_no_shadowing()?;
        canonical_json(self)
    }

    pub fn ensure_no_shadowing(&self) -> Result<(), CentinelError> {
        check_extra_fields(&self.extra)
    }

    /// Chain hash of `content` under this metadata, linked to `previous_hash`.
    pub fn chain_hash(&self, content: &[u8], previous_hash: Option<&str>) -> Result<String, CentinelError> {
        let meta = self.canonical_bytes()?;
        Ok(chain_hash(content, previous_hash, Some(&meta), Some(&self.timestamp_utc)))
    }
}

/// Reject extra fields named like a typed metadata field. A flattened
/// duplicate is written twice and makes the metadata file unreadable.
pub fn check_extra_fields(extra: &BTreeMap<String, Value>) -> Result<(), CentinelError> {
    match RESERVED_METADATA_KEYS.iter().find(|key| extra.contains_key(**key)) {
        Some(key) => Err(CentinelError::InvalidInput(format!(
            "snapshot metadata field `{}` is reserved",
            key
        ))),
        None => Ok(()),
    }
}

/// One line of the audit ledger `hashes/chain.json`. Written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub timestamp: String,
    pub hash: String,
    pub previous_hash: Option<String>,
    pub snapshot_path: String,
}
