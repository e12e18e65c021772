// crates/centinel-cli/src/config.rs
//
// Runtime configuration for the Centinel CLI.
// Loaded from a TOML file or populated with defaults. The checkpoint base key
// is never part of this file: it comes from CENTINEL_CHECKPOINT_KEY.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use centinel_recovery::{RecoverySettings, StalePolicy};
use centinel_store::{RetryPolicy, S3Settings};

/// Environment variable holding the 256-bit checkpoint base key.
pub const KEY_ENV: &str = "CENTINEL_CHECKPOINT_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct CentinelConfig {
    /// Root for snapshots, ledger and local checkpoints.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Encrypted checkpoint storage. With no `bucket`, recovery reads the local
/// checkpoint directory instead.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_pipeline_version")]
    pub pipeline_version: String,
    #[serde(default)]
    pub run_id: Option<String>,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recent_threshold")]
    pub recent_threshold_minutes: f64,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_minutes: f64,
    /// "continue", "reprocess" or "pause". Anything else pauses.
    #[serde(default)]
    pub stale_policy: Option<String>,
    #[serde(default)]
    pub expected_source_format: Option<String>,
}

fn default_storage_path() -> String {
    "~/.centinel/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prefix() -> String {
    "centinel/checkpoints".to_string()
}

fn default_pipeline_version() -> String {
    "v1".to_string()
}

fn default_max_in_flight() -> usize {
    4
}

fn default_op_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_secs() -> f64 {
    1.0
}

fn default_recent_threshold() -> f64 {
    15.0
}

fn default_stale_threshold() -> f64 {
    60.0
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            endpoint: None,
            region: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: default_prefix(),
            pipeline_version: default_pipeline_version(),
            run_id: None,
            max_in_flight: default_max_in_flight(),
            op_timeout_secs: default_op_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            recent_threshold_minutes: default_recent_threshold(),
            stale_threshold_minutes: default_stale_threshold(),
            stale_policy: None,
            expected_source_format: None,
        }
    }
}

impl Default for CentinelConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            log_level: default_log_level(),
            checkpoint: CheckpointConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl CentinelConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: CentinelConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// `load`, falling back to defaults when the file does not exist. The
    /// flag reports whether the fallback was taken.
    pub fn load_or_default(path: &Path) -> Result<(Self, bool), Box<dyn std::error::Error>> {
        if path.exists() {
            Ok((Self::load(path)?, false))
        } else {
            Ok((Self::default(), true))
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        expand_path(&self.storage_path)
    }

    /// Negative, NaN and infinite `backoff_base_secs` are rejected.
    pub fn retry_policy(&self) -> Result<RetryPolicy, Box<dyn std::error::Error>> {
        let c = &self.checkpoint;
        let base_delay = Duration::try_from_secs_f64(c.backoff_base_secs).map_err(|e| {
            format!(
                "checkpoint.backoff_base_secs = {} is not a valid duration: {}",
                c.backoff_base_secs, e
            )
        })?;
        Ok(RetryPolicy {
            max_attempts: c.max_attempts,
            base_delay,
            op_timeout: Duration::from_secs(c.op_timeout_secs),
            max_in_flight: c.max_in_flight,
        })
    }

    pub fn s3_settings(&self) -> Option<S3Settings> {
        let c = &self.checkpoint;
        c.bucket.as_ref().map(|bucket| S3Settings {
            bucket: bucket.clone(),
            endpoint: c.endpoint.clone(),
            region: c.region.clone(),
            access_key_id: c.access_key_id.clone(),
            secret_access_key: c.secret_access_key.clone(),
        })
    }

    pub fn recovery_settings(&self) -> RecoverySettings {
        let r = &self.recovery;
        RecoverySettings {
            recent_threshold_minutes: r.recent_threshold_minutes,
            stale_threshold_minutes: r.stale_threshold_minutes,
            stale_policy: StalePolicy::from_setting(r.stale_policy.as_deref()),
            expected_source_format: r.expected_source_format.clone(),
        }
    }
}

/// Default config location: `~/.centinel/config.toml`.
pub fn default_config_path() -> PathBuf {
    expand_path("~/.centinel/config.toml")
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
