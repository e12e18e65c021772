// crates/centinel-store/src/snapshot.rs
//
// SnapshotStore: persists each collected artifact as
//
//   <root>/snapshots/<YYYY>/<MM>/<DD>/<HH-MM-SS>/
//       snapshot.raw             raw bytes as fetched
//       snapshot.metadata.json   enriched SnapshotMetadata
//       hash.txt                 chain hash over (content, previous, metadata, timestamp)
//
// and appends a ChainEntry to the audit ledger. Every file is written through
// a temp file and rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use centinel_core::crypto::is_hex_digest;
use centinel_core::error::CentinelError;
use centinel_core::snapshot::{
    check_extra_fields, ChainEntry, SnapshotMetadata, HASH_FILE, METADATA_FILE, RAW_FILE, SNAPSHOTS_DIR,
};

use crate::fsutil::write_atomic;
use crate::ledger::HashLedger;

/// Source URL recorded when the caller supplies none.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Input for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRequest {
    pub source_url: Option<String>,
    /// Artifact-specific metadata fields.
    pub fields: BTreeMap<String, Value>,
}

impl SnapshotRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Split into the typed source URL and the remaining fields.
    ///
    /// A string `source_url` among the fields is taken as the source when
    /// none was given explicitly and dropped when it repeats it. The other
    /// reserved metadata names belong to the store and are rejected.
    fn into_parts(self) -> Result<(String, BTreeMap<String, Value>), CentinelError> {
        let mut fields = self.fields;
        let source_url = match (self.source_url, fields.remove("source_url")) {
            (explicit, None) => explicit,
            (None, Some(Value::String(url))) => Some(url),
            (Some(explicit), Some(Value::String(url))) if url == explicit => Some(explicit),
            (_, Some(other)) => {
                return Err(CentinelError::InvalidInput(format!(
                    "conflicting source_url field: {}",
                    other
                )))
            }
        };
        check_extra_fields(&fields)?;
        Ok((source_url.unwrap_or_else(|| UNKNOWN_SOURCE.to_string()), fields))
    }
}

/// What was written for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub dir: PathBuf,
    pub hash: String,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    software_version: String,
    ledger: HashLedger,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, software_version: impl Into<String>) -> Self {
        let root = root.into();
        let ledger = HashLedger::new(&root);
        Self {
            root,
            software_version: software_version.into(),
            ledger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    /// Snapshot `content` now, chained to the ledger's last hash.
    pub fn append(&self, content: &[u8], request: SnapshotRequest) -> Result<SnapshotRecord, CentinelError> {
        let previous = self.ledger.tail_hash()?;
        self.save_snapshot(content, request, previous.as_deref(), Utc::now())
    }

    /// Snapshot `content` at `at`, chained to `previous_hash`.
    pub fn save_snapshot(
        &self,
        content: &[u8],
        request: SnapshotRequest,
        previous_hash: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<SnapshotRecord, CentinelError> {
        let (source_url, extra) = request.into_parts()?;
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let metadata = SnapshotMetadata {
            source_url,
            timestamp_utc: timestamp.clone(),
            software_version: self.software_version.clone(),
            previous_hash: previous_hash.map(str::to_string),
            extra,
        };
        let hash = metadata.chain_hash(content, previous_hash)?;

        let dir = self.allocate_dir(at)?;
        write_atomic(&dir.join(RAW_FILE), content)?;
        write_atomic(&dir.join(METADATA_FILE), &serde_json::to_vec_pretty(&metadata)?)?;
        write_atomic(&dir.join(HASH_FILE), hash.as_bytes())?;

        self.ledger.append(ChainEntry {
            timestamp,
            hash: hash.clone(),
            previous_hash: previous_hash.map(str::to_string),
            snapshot_path: self.relative(&dir),
        })?;

        if previous_hash.is_some_and(|p| !is_hex_digest(p)) {
            tracing::warn!(dir = %dir.display(), "Snapshot chained to a malformed previous hash");
        }
        tracing::info!(dir = %dir.display(), hash = %hash, "Snapshot stored");

        Ok(SnapshotRecord { dir, hash, metadata })
    }

    /// `<root>/snapshots/YYYY/MM/DD/HH-MM-SS`, with `-N` appended when a
    /// snapshot already exists for that second.
    fn allocate_dir(&self, at: DateTime<Utc>) -> Result<PathBuf, CentinelError> {
        let day = self
            .root
            .join(SNAPSHOTS_DIR)
            .join(at.format("%Y").to_string())
            .join(at.format("%m").to_string())
            .join(at.format("%d").to_string());
        let second = at.format("%H-%M-%S").to_string();

        let mut candidate = day.join(&second);
        let mut n = 1u32;
        while candidate.exists() {
            candidate = day.join(format!("{}-{}", second, n));
            n += 1;
        }
        std::fs::create_dir_all(&candidate)?;
        Ok(candidate)
    }

    fn relative(&self, dir: &Path) -> String {
        let rel = dir.strip_prefix(&self.root).unwrap_or(dir);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}
