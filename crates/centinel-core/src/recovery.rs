// crates/centinel-core/src/recovery.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed set of ways a pipeline may resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    StartFromBeginning,
    ContinueFromLastActa,
    ReprocessLastBatch,
    SkipToNextValid,
    PauseAndAlert,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::StartFromBeginning => "START_FROM_BEGINNING",
            DecisionKind::ContinueFromLastActa => "CONTINUE_FROM_LAST_ACTA",
            DecisionKind::ReprocessLastBatch => "REPROCESS_LAST_BATCH",
            DecisionKind::SkipToNextValid => "SKIP_TO_NEXT_VALID",
            DecisionKind::PauseAndAlert => "PAUSE_AND_ALERT",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single recovery attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryDecision {
    pub decision_kind: DecisionKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acta_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Path or object key of the checkpoint the decision was based on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_age_minutes: Option<f64>,
    /// Human-readable strings for operator notification channels.
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl RecoveryDecision {
    pub fn new(decision_kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            decision_kind,
            reason: reason.into(),
            acta_id: None,
            offset: None,
            batch_id: None,
            checkpoint_path: None,
            checkpoint_age_minutes: None,
            alerts: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_position(
        mut self,
        acta_id: Option<String>,
        offset: Option<u64>,
        batch_id: Option<String>,
    ) -> Self {
        self.acta_id = acta_id;
        self.offset = offset;
        self.batch_id = batch_id;
        self
    }

    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn with_age(mut self, minutes: f64) -> Self {
        self.checkpoint_age_minutes = Some(minutes);
        self
    }

    pub fn with_alert(mut self, alert: impl Into<String>) -> Self {
        self.alerts.push(alert.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// True for decisions that must reach an operator.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self.decision_kind,
            DecisionKind::PauseAndAlert | DecisionKind::StartFromBeginning
        )
    }
}

/// What an external probe observes about the live data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    #[serde(default)]
    pub last_acta_id: Option<String>,
    #[serde(default)]
    pub last_offset: Option<u64>,
    #[serde(default)]
    pub last_batch_id: Option<String>,
    #[serde(default)]
    pub source_format: Option<String>,
    pub is_consistent: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            last_acta_id: None,
            last_offset: None,
            last_batch_id: None,
            source_format: None,
            is_consistent: true,
            notes: None,
        }
    }
}
