// crates/centinel-recovery/src/source.rs
//
// Where the Recovery Engine gets its checkpoints from.
//
// A source enumerates candidates (newest first) and loads them one at a time.
// Loading never fails with an error: every outcome is a `LoadOutcome`
// variant, so the engine's branching is exhaustive.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use centinel_core::checkpoint::CheckpointState;
use centinel_core::error::CheckpointError;

/// A checkpoint that may or may not load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointCandidate {
    /// File path or object key.
    pub location: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

impl CheckpointCandidate {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            modified: None,
        }
    }
}

/// Resume position carried by a checkpoint, whichever source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acta_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

const RESERVED_FIELDS: [&str; 7] = [
    "acta_id",
    "last_hash",
    "offset",
    "batch_id",
    "created_at",
    "source_format",
    "checksum",
];

impl CheckpointRecord {
    pub fn new(acta_id: impl Into<String>, offset: u64, batch_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            acta_id: Some(acta_id.into()),
            last_hash: None,
            offset: Some(offset),
            batch_id: Some(batch_id.into()),
            created_at,
            source_format: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_source_format(mut self, format: impl Into<String>) -> Self {
        self.source_format = Some(format.into());
        self
    }

    /// Parse the local checkpoint file format.
    ///
    /// `acta_id`, `offset`, `batch_id` and `created_at` are required; any
    /// problem here is total (not partial) corruption.
    pub fn from_local_map(map: &Map<String, Value>) -> Result<Self, CheckpointError> {
        let field = |name: &str| {
            map.get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| CheckpointError::corrupt(format!("Missing required checkpoint field: '{}'", name)))
        };

        let acta_id = scalar_string(field("acta_id")?)
            .ok_or_else(|| CheckpointError::corrupt("Invalid checkpoint field type: acta_id"))?;
        let batch_id = scalar_string(field("batch_id")?)
            .ok_or_else(|| CheckpointError::corrupt("Invalid checkpoint field type: batch_id"))?;
        let offset = parse_offset(field("offset")?)?;
        let created_at = field("created_at")?
            .as_str()
            .and_then(parse_timestamp)
            .ok_or_else(|| CheckpointError::corrupt("Invalid checkpoint field type: created_at"))?;

        let metadata = map
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            acta_id: Some(acta_id),
            last_hash: map.get("last_hash").and_then(Value::as_str).map(str::to_string),
            offset: Some(offset),
            batch_id: Some(batch_id),
            created_at,
            source_format: map.get("source_format").and_then(Value::as_str).map(str::to_string),
            metadata,
        })
    }

    /// Project a decrypted checkpoint state onto a resume position.
    pub fn from_state(state: &CheckpointState) -> Self {
        let mut metadata = state.extra.clone();
        metadata.insert(
            "accumulated_hash_chain".to_string(),
            Value::String(state.accumulated_hash_chain.clone()),
        );
        metadata.insert("run_id".to_string(), Value::String(state.run_id.clone()));
        metadata.insert(
            "pipeline_version".to_string(),
            Value::String(state.pipeline_version.clone()),
        );
        Self {
            acta_id: state.marker.last_acta_id().map(str::to_string),
            last_hash: state.marker.last_hash().map(str::to_string),
            offset: state.cursor.current_offset(),
            batch_id: state.cursor.batch_id().map(str::to_string),
            created_at: state.last_timestamp,
            source_format: state.source_format.clone(),
            metadata,
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_offset(value: &Value) -> Result<u64, CheckpointError> {
    let signed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| CheckpointError::corrupt("Invalid checkpoint field type: offset"))?;
    u64::try_from(signed).map_err(|_| CheckpointError::corrupt("Checkpoint offset must be >= 0."))
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCheckpoint {
    pub record: CheckpointRecord,
    /// Non-fatal findings, e.g. no checksum to verify.
    pub warnings: Vec<String>,
}

/// Result of loading one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(LoadedCheckpoint),
    /// The candidate no longer exists.
    Missing,
    /// `partial` marks a payload that parsed but failed its integrity check.
    Corrupt { partial: bool, reason: String },
    /// Storage could not be reached within the retry budget.
    StorageUnavailable(String),
}

impl From<CheckpointError> for LoadOutcome {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::Corrupt { partial, reason } => LoadOutcome::Corrupt { partial, reason },
            CheckpointError::Storage(reason) => LoadOutcome::StorageUnavailable(reason),
            other => LoadOutcome::Corrupt {
                partial: false,
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait CheckpointSource: Send + Sync {
    /// Candidates, most recent first.
    async fn candidates(&self) -> Result<Vec<CheckpointCandidate>, CheckpointError>;

    async fn load(&self, candidate: &CheckpointCandidate) -> LoadOutcome;

    /// Where this source reads from, for logs.
    fn describe(&self) -> String;
}
