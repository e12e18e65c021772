// crates/centinel-core/src/checkpoint.rs
//
// Checkpoint data model.
//
// `CheckpointDraft` is what a pipeline hands to the store: every field is
// optional so missing keys can be reported together. `CheckpointState` is the
// validated form; it cannot be constructed without the required keys, at
// least one of {last_acta_id, last_hash} and at least one of
// {current_offset, batch_id}.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckpointError;

/// Schema version written into every envelope.
pub const ENVELOPE_SCHEMA_VERSION: u32 = 2;

/// Keys every checkpoint state must carry.
pub const REQUIRED_STATE_KEYS: [&str; 5] = [
    "accumulated_hash_chain",
    "rule_states",
    "last_timestamp",
    "pipeline_version",
    "run_id",
];

/// Names of the typed checkpoint fields. `extra` may not reuse them: a
/// flattened duplicate would overwrite the validated value on serialization.
pub const RESERVED_STATE_KEYS: [&str; 10] = [
    "accumulated_hash_chain",
    "rule_states",
    "last_timestamp",
    "pipeline_version",
    "run_id",
    "last_acta_id",
    "last_hash",
    "current_offset",
    "batch_id",
    "source_format",
];

/// Status of a single analysis rule at checkpoint time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    pub status: String,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RuleState {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            last_error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            last_error: Some(error.into()),
        }
    }
}

/// Identity a checkpoint belongs to. Checkpoints from another pipeline
/// version or run are never resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointIdentity {
    pub pipeline_version: String,
    pub run_id: String,
}

impl CheckpointIdentity {
    pub fn new(pipeline_version: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            pipeline_version: pipeline_version.into(),
            run_id: run_id.into(),
        }
    }

    /// Associated data bound into the AEAD tag.
    pub fn aad(&self) -> Vec<u8> {
        format!("{}/{}", self.pipeline_version, self.run_id).into_bytes()
    }
}

/// Unvalidated checkpoint payload as produced by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulated_hash_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_states: Option<BTreeMap<String, RuleState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_acta_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    /// Pipeline-specific fields carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CheckpointDraft {
    /// Parse a raw JSON payload. Non-objects and mistyped fields are
    /// validation errors.
    pub fn from_value(value: Value) -> Result<Self, CheckpointError> {
        if !value.is_object() {
            return Err(CheckpointError::invalid("checkpoint payload must be a JSON object"));
        }
        serde_json::from_value(value)
            .map_err(|e| CheckpointError::invalid(format!("checkpoint payload has invalid field: {}", e)))
    }

    /// Fill identity and timestamp if the pipeline left them out.
    pub fn fill_defaults(&mut self, identity: &CheckpointIdentity, now: DateTime<Utc>) {
        if self.last_timestamp.is_none() {
            self.last_timestamp = Some(now);
        }
        if self.pipeline_version.is_none() {
            self.pipeline_version = Some(identity.pipeline_version.clone());
        }
        if self.run_id.is_none() {
            self.run_id = Some(identity.run_id.clone());
        }
    }
}

/// Where in the acta stream the pipeline was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActaMarker {
    last_acta_id: Option<String>,
    last_hash: Option<String>,
}

impl ActaMarker {
    pub fn acta(acta_id: impl Into<String>) -> Self {
        Self {
            last_acta_id: Some(acta_id.into()),
            last_hash: None,
        }
    }

    pub fn hash(hash: impl Into<String>) -> Self {
        Self {
            last_acta_id: None,
            last_hash: Some(hash.into()),
        }
    }

    pub fn both(acta_id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            last_acta_id: Some(acta_id.into()),
            last_hash: Some(hash.into()),
        }
    }

    fn from_parts(last_acta_id: Option<String>, last_hash: Option<String>) -> Option<Self> {
        if last_acta_id.is_none() && last_hash.is_none() {
            return None;
        }
        Some(Self {
            last_acta_id,
            last_hash,
        })
    }

    pub fn last_acta_id(&self) -> Option<&str> {
        self.last_acta_id.as_deref()
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}

/// How far into the current batch the pipeline was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCursor {
    current_offset: Option<u64>,
    batch_id: Option<String>,
}

impl BatchCursor {
    pub fn offset(offset: u64) -> Self {
        Self {
            current_offset: Some(offset),
            batch_id: None,
        }
    }

    pub fn batch(batch_id: impl Into<String>) -> Self {
        Self {
            current_offset: None,
            batch_id: Some(batch_id.into()),
        }
    }

    pub fn both(offset: u64, batch_id: impl Into<String>) -> Self {
        Self {
            current_offset: Some(offset),
            batch_id: Some(batch_id.into()),
        }
    }

    fn from_parts(current_offset: Option<u64>, batch_id: Option<String>) -> Option<Self> {
        if current_offset.is_none() && batch_id.is_none() {
            return None;
        }
        Some(Self {
            current_offset,
            batch_id,
        })
    }

    pub fn current_offset(&self) -> Option<u64> {
        self.current_offset
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }
}

/// Validated plaintext checkpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CheckpointDraft", into = "CheckpointDraft")]
pub struct CheckpointState {
    pub accumulated_hash_chain: String,
    pub rule_states: BTreeMap<String, RuleState>,
    pub last_timestamp: DateTime<Utc>,
    pub pipeline_version: String,
    pub run_id: String,
    pub marker: ActaMarker,
    pub cursor: BatchCursor,
    pub source_format: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl CheckpointState {
    pub fn identity(&self) -> CheckpointIdentity {
        CheckpointIdentity::new(self.pipeline_version.clone(), self.run_id.clone())
    }

    /// Reject a state whose identity differs from `expected`.
    pub fn ensure_identity(&self, expected: &CheckpointIdentity) -> Result<(), CheckpointError> {
        if self.pipeline_version != expected.pipeline_version {
            return Err(CheckpointError::invalid(format!(
                "pipeline_version mismatch: expected {}, found {}",
                expected.pipeline_version, self.pipeline_version
            )));
        }
        if self.run_id != expected.run_id {
            return Err(CheckpointError::invalid(format!(
                "run_id mismatch: expected {}, found {}",
                expected.run_id, self.run_id
            )));
        }
        Ok(())
    }
}

impl TryFrom<CheckpointDraft> for CheckpointState {
    type Error = CheckpointError;

    fn try_from(draft: CheckpointDraft) -> Result<Self, Self::Error> {
        let shadowed: Vec<&str> = draft
            .extra
            .keys()
            .map(String::as_str)
            .filter(|key| RESERVED_STATE_KEYS.contains(key))
            .collect();
        if !shadowed.is_empty() {
            return Err(CheckpointError::invalid(format!(
                "extra fields reuse reserved keys: {}",
                shadowed.join(", ")
            )));
        }

        let mut missing = Vec::new();
        if draft.accumulated_hash_chain.is_none() {
            missing.push("accumulated_hash_chain".to_string());
        }
        if draft.rule_states.is_none() {
            missing.push("rule_states".to_string());
        }
        if draft.last_timestamp.is_none() {
            missing.push("last_timestamp".to_string());
        }
        if draft.pipeline_version.is_none() {
            missing.push("pipeline_version".to_string());
        }
        if draft.run_id.is_none() {
            missing.push("run_id".to_string());
        }

        let marker = ActaMarker::from_parts(draft.last_acta_id, draft.last_hash);
        if marker.is_none() {
            missing.push("last_acta_id|last_hash".to_string());
        }
        let cursor = BatchCursor::from_parts(draft.current_offset, draft.batch_id);
        if cursor.is_none() {
            missing.push("current_offset|batch_id".to_string());
        }

        match (
            draft.accumulated_hash_chain,
            draft.rule_states,
            draft.last_timestamp,
            draft.pipeline_version,
            draft.run_id,
            marker,
            cursor,
        ) {
            (
                Some(accumulated_hash_chain),
                Some(rule_states),
                Some(last_timestamp),
                Some(pipeline_version),
                Some(run_id),
                Some(marker),
                Some(cursor),
            ) => Ok(CheckpointState {
                accumulated_hash_chain,
                rule_states,
                last_timestamp,
                pipeline_version,
                run_id,
                marker,
                cursor,
                source_format: draft.source_format,
                extra: draft.extra,
            }),
            _ => Err(CheckpointError::missing_keys(missing)),
        }
    }
}

impl From<CheckpointState> for CheckpointDraft {
    fn from(state: CheckpointState) -> Self {
        CheckpointDraft {
            accumulated_hash_chain: Some(state.accumulated_hash_chain),
            rule_states: Some(state.rule_states),
            last_timestamp: Some(state.last_timestamp),
            pipeline_version: Some(state.pipeline_version),
            run_id: Some(state.run_id),
            last_acta_id: state.marker.last_acta_id,
            last_hash: state.marker.last_hash,
            current_offset: state.cursor.current_offset,
            batch_id: state.cursor.batch_id,
            source_format: state.source_format,
            extra: state.extra,
        }
    }
}

/// Validate a decrypted payload: shape, required keys, alternatives, and
/// that it belongs to `expected`.
pub fn validate_payload(
    payload: &Value,
    expected: &CheckpointIdentity,
) -> Result<CheckpointState, CheckpointError> {
    let draft = CheckpointDraft::from_value(payload.clone())?;
    let state = CheckpointState::try_from(draft)?;
    state.ensure_identity(expected)?;
    Ok(state)
}

/// The unit persisted to the object store.
///
/// `ciphertext_hash` covers the raw ciphertext bytes and is checked before
/// any decryption is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub schema_version: u32,
    pub pipeline_version: String,
    pub run_id: String,
    /// ISO-8601 UTC timestamp of the save.
    pub timestamp: String,
    /// base64url of the 16-byte IV / HKDF salt.
    pub iv: String,
    /// base64url of the AEAD ciphertext.
    pub ciphertext: String,
    /// Hex SHA-256 of the raw ciphertext bytes.
    pub ciphertext_hash: String,
}
