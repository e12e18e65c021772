// crates/centinel-recovery/src/policy.rs

use serde::{Deserialize, Serialize};

/// What to do with a checkpoint older than the stale threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    Continue,
    Reprocess,
    #[default]
    Pause,
}

impl StalePolicy {
    /// `continue` and `reprocess` are recognised (case-insensitive); any
    /// other value, or none, pauses.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("continue") => StalePolicy::Continue,
            Some("reprocess") => StalePolicy::Reprocess,
            _ => StalePolicy::Pause,
        }
    }
}

/// Everything the engine is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySettings {
    /// Ages at or below this many minutes resume directly.
    pub recent_threshold_minutes: f64,
    /// Ages at or above this many minutes go through `stale_policy`.
    pub stale_threshold_minutes: f64,
    pub stale_policy: StalePolicy,
    pub expected_source_format: Option<String>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            recent_threshold_minutes: 15.0,
            stale_threshold_minutes: 60.0,
            stale_policy: StalePolicy::Pause,
            expected_source_format: None,
        }
    }
}

impl RecoverySettings {
    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_expected_format(mut self, format: impl Into<String>) -> Self {
        self.expected_source_format = Some(format.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing_defaults_to_pause() {
        assert_eq!(StalePolicy::from_setting(Some("continue")), StalePolicy::Continue);
        assert_eq!(StalePolicy::from_setting(Some(" Reprocess ")), StalePolicy::Reprocess);
        assert_eq!(StalePolicy::from_setting(Some("pause")), StalePolicy::Pause);
        assert_eq!(StalePolicy::from_setting(Some("resume-ish")), StalePolicy::Pause);
        assert_eq!(StalePolicy::from_setting(None), StalePolicy::Pause);
    }

    #[test]
    fn test_default_thresholds() {
        let settings = RecoverySettings::default();
        assert_eq!(settings.recent_threshold_minutes, 15.0);
        assert_eq!(settings.stale_threshold_minutes, 60.0);
        assert_eq!(settings.stale_policy, StalePolicy::Pause);
    }
}
