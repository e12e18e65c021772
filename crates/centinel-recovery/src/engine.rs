// crates/centinel-recovery/src/engine.rs
//
// RecoveryEngine: decides, once per startup, how the pipeline resumes.
//
// 1. Enumerate candidates, newest first.
// 2. Load candidates in order until one succeeds; rejections are warnings.
//    Storage exhaustion on one candidate ends the scan.
// 3. None loaded, and at least one was partially corrupt: REPROCESS_LAST_BATCH.
// 4. None loaded otherwise: START_FROM_BEGINNING with a critical alert.
// 5. Checkpoint source_format differs from the expected one: PAUSE_AND_ALERT.
// 6. Live probe (if any): format drift pauses, inconsistency skips ahead.
// 7. Otherwise classify by age against the recent/stale thresholds.
//
// The engine holds only configuration; every call starts from scratch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use centinel_core::recovery::{DecisionKind, RecoveryDecision, RecoveryState};
use centinel_core::traits::StateProbe;

use crate::policy::{RecoverySettings, StalePolicy};
use crate::source::{CheckpointCandidate, CheckpointRecord, CheckpointSource, LoadOutcome};

pub const ALERT_NO_CHECKPOINT: &str = "Critical: no checkpoint available.";
pub const ALERT_NO_VALID_CHECKPOINT: &str = "Critical: no valid checkpoint.";
pub const ALERT_PARTIAL_CORRUPTION: &str = "Checkpoint partially corrupt.";

pub struct RecoveryEngine {
    source: Arc<dyn CheckpointSource>,
    settings: RecoverySettings,
    probe: Option<Arc<dyn StateProbe>>,
}

/// Tally of rejected candidates.
#[derive(Default)]
struct Rejections {
    warnings: Vec<String>,
    partial: bool,
    corrupt: usize,
    missing: usize,
    unavailable: usize,
}

impl Rejections {
    fn only_absent(&self) -> bool {
        self.corrupt == 0 && self.unavailable == 0
    }
}

impl RecoveryEngine {
    pub fn new(source: Arc<dyn CheckpointSource>, settings: RecoverySettings) -> Self {
        Self {
            source,
            settings,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn StateProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    pub async fn recover(&self) -> RecoveryDecision {
        self.recover_at(Utc::now()).await
    }

    /// Decide as if the current time were `now`.
    pub async fn recover_at(&self, now: DateTime<Utc>) -> RecoveryDecision {
        tracing::info!(source = %self.source.describe(), "Recovery started");

        let candidates = match self.source.candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                return self.finish(
                    RecoveryDecision::new(
                        DecisionKind::StartFromBeginning,
                        "Checkpoint storage unavailable. Starting from beginning.",
                    )
                    .with_alert(ALERT_NO_CHECKPOINT)
                    .with_metadata("error", Value::String(e.to_string())),
                );
            }
        };
        if candidates.is_empty() {
            return self.finish(
                RecoveryDecision::new(
                    DecisionKind::StartFromBeginning,
                    "No checkpoint files found. Starting from beginning.",
                )
                .with_alert(ALERT_NO_CHECKPOINT),
            );
        }

        let mut rejections = Rejections::default();
        let mut loaded = None;
        for candidate in &candidates {
            match self.source.load(candidate).await {
                LoadOutcome::Loaded(checkpoint) => {
                    rejections.warnings.extend(checkpoint.warnings);
                    loaded = Some((candidate, checkpoint.record));
                    break;
                }
                LoadOutcome::Missing => {
                    rejections.missing += 1;
                    rejections
                        .warnings
                        .push(format!("Checkpoint {} rejected: not found", candidate.location.display()));
                }
                LoadOutcome::Corrupt { partial, reason } => {
                    rejections.corrupt += 1;
                    rejections.partial |= partial;
                    rejections
                        .warnings
                        .push(format!("Checkpoint {} rejected: {}", candidate.location.display(), reason));
                }
                LoadOutcome::StorageUnavailable(reason) => {
                    rejections.unavailable += 1;
                    rejections.warnings.push(format!(
                        "Checkpoint {} rejected: storage unavailable: {}",
                        candidate.location.display(),
                        reason
                    ));
                    // The remaining candidates sit on the same storage and
                    // would each spend a full retry budget.
                    break;
                }
            }
        }
        for warning in &rejections.warnings {
            tracing::warn!(warning = %warning, "Checkpoint warning");
        }

        let Some((candidate, record)) = loaded else {
            return self.finish(Self::without_checkpoint(&rejections));
        };

        tracing::info!(
            path = %candidate.location.display(),
            acta_id = ?record.acta_id,
            offset = ?record.offset,
            batch_id = ?record.batch_id,
            created_at = %record.created_at,
            "Checkpoint loaded"
        );

        if let Some(decision) = self.check_format(candidate, record.source_format.as_deref(), false) {
            return self.finish(decision);
        }

        if let Some(probe) = &self.probe {
            let state = probe.probe().await;
            log_state_differences(&record, &state);
            if let Some(decision) = self.check_format(candidate, state.source_format.as_deref(), true) {
                return self.finish(decision);
            }
            if !state.is_consistent {
                let message = "Detected irrecoverable gaps; skipping to next valid point.";
                return self.finish(
                    RecoveryDecision::new(DecisionKind::SkipToNextValid, message)
                        .with_checkpoint_path(&candidate.location)
                        .with_alert(message)
                        .with_metadata("state_notes", json!(state.notes)),
                );
            }
        }

        let age_minutes = (now - record.created_at).num_milliseconds() as f64 / 60_000.0;
        self.finish(self.decide_from_age(candidate, &record, age_minutes))
    }

    fn without_checkpoint(rejections: &Rejections) -> RecoveryDecision {
        if rejections.partial {
            return RecoveryDecision::new(
                DecisionKind::ReprocessLastBatch,
                "Checkpoint partially corrupt; reprocessing last batch.",
            )
            .with_alert(ALERT_PARTIAL_CORRUPTION)
            .with_metadata("rejected", json!(rejections.warnings));
        }
        if rejections.only_absent() {
            return RecoveryDecision::new(
                DecisionKind::StartFromBeginning,
                "No checkpoint files found. Starting from beginning.",
            )
            .with_alert(ALERT_NO_CHECKPOINT);
        }
        if rejections.corrupt == 0 {
            return RecoveryDecision::new(
                DecisionKind::StartFromBeginning,
                "Checkpoint storage unavailable. Starting from beginning.",
            )
            .with_alert(ALERT_NO_CHECKPOINT)
            .with_metadata("rejected", json!(rejections.warnings));
        }
        RecoveryDecision::new(
            DecisionKind::StartFromBeginning,
            "No valid checkpoint available. Starting from beginning.",
        )
        .with_alert(ALERT_NO_VALID_CHECKPOINT)
        .with_metadata("rejected", json!(rejections.warnings))
    }

    /// PAUSE_AND_ALERT when both `found` and the expected format are set and
    /// disagree.
    fn check_format(&self, candidate: &CheckpointCandidate, found: Option<&str>, live: bool) -> Option<RecoveryDecision> {
        let expected = self.settings.expected_source_format.as_deref()?;
        let found = found?;
        if found == expected {
            return None;
        }
        let message = if live {
            "Source format changed in live state; pausing recovery."
        } else {
            "Source format changed; pausing to avoid unsafe recovery."
        };
        tracing::error!(expected, found, live, "Source format mismatch");
        Some(
            RecoveryDecision::new(DecisionKind::PauseAndAlert, message)
                .with_checkpoint_path(&candidate.location)
                .with_alert(message)
                .with_metadata("expected_source_format", json!(expected))
                .with_metadata("found_source_format", json!(found)),
        )
    }

    fn decide_from_age(&self, candidate: &CheckpointCandidate, record: &CheckpointRecord, age_minutes: f64) -> RecoveryDecision {
        let resume = |kind: DecisionKind, reason: &str| {
            RecoveryDecision::new(kind, reason)
                .with_position(record.acta_id.clone(), record.offset, record.batch_id.clone())
                .with_checkpoint_path(&candidate.location)
                .with_age(age_minutes)
        };

        if age_minutes <= self.settings.recent_threshold_minutes {
            return resume(
                DecisionKind::ContinueFromLastActa,
                "Checkpoint is recent; continuing from last acta.",
            );
        }
        if age_minutes >= self.settings.stale_threshold_minutes {
            return match self.settings.stale_policy {
                StalePolicy::Continue => resume(
                    DecisionKind::ContinueFromLastActa,
                    "Checkpoint is stale; configured to continue.",
                ),
                StalePolicy::Reprocess => resume(
                    DecisionKind::ReprocessLastBatch,
                    "Checkpoint is stale; configured to reprocess last batch.",
                ),
                StalePolicy::Pause => {
                    let reason = "Checkpoint is stale; pausing for operator decision.";
                    RecoveryDecision::new(DecisionKind::PauseAndAlert, reason)
                        .with_checkpoint_path(&candidate.location)
                        .with_age(age_minutes)
                        .with_alert(reason)
                }
            };
        }
        resume(
            DecisionKind::ContinueFromLastActa,
            "Checkpoint is moderately old; continuing from last acta.",
        )
    }

    fn finish(&self, decision: RecoveryDecision) -> RecoveryDecision {
        if decision.needs_operator() {
            tracing::error!(
                decision = %decision.decision_kind,
                reason = %decision.reason,
                alerts = ?decision.alerts,
                "Recovery decision requires operator attention"
            );
        } else {
            tracing::info!(
                decision = %decision.decision_kind,
                reason = %decision.reason,
                age_minutes = ?decision.checkpoint_age_minutes,
                "Recovery decision"
            );
        }
        decision
    }
}

fn log_state_differences(record: &CheckpointRecord, state: &RecoveryState) {
    let mut differences = serde_json::Map::new();
    if let Some(live) = &state.last_acta_id {
        if record.acta_id.as_ref() != Some(live) {
            differences.insert("acta_id".into(), json!({"checkpoint": record.acta_id, "state": live}));
        }
    }
    if let Some(live) = state.last_offset {
        if record.offset != Some(live) {
            differences.insert("offset".into(), json!({"checkpoint": record.offset, "state": live}));
        }
    }
    if let Some(live) = &state.last_batch_id {
        if record.batch_id.as_ref() != Some(live) {
            differences.insert("batch_id".into(), json!({"checkpoint": record.batch_id, "state": live}));
        }
    }
    if !differences.is_empty() {
        tracing::warn!(differences = %serde_json::Value::Object(differences), "Checkpoint differs from live state");
    }
}
