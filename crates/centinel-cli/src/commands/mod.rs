// crates/centinel-cli/src/commands/mod.rs
//
// Command module declarations for the Centinel CLI, plus wiring shared by
// the commands that touch encrypted checkpoints.

pub mod checkpoints;
pub mod keygen;
pub mod recover;
pub mod verify;

use std::sync::Arc;

use centinel_core::checkpoint::CheckpointIdentity;
use centinel_core::crypto::BaseKey;
use centinel_store::{EncryptedCheckpointStore, OpendalStore, StorageExecutor};

use crate::config::{CentinelConfig, KEY_ENV};

/// Build the encrypted checkpoint store described by `config`, or `None`
/// when no bucket is configured.
pub fn open_checkpoint_store(
    config: &CentinelConfig,
) -> Result<Option<EncryptedCheckpointStore>, Box<dyn std::error::Error>> {
    let Some(s3) = config.s3_settings() else {
        return Ok(None);
    };
    let run_id = config
        .checkpoint
        .run_id
        .clone()
        .ok_or("checkpoint.run_id must be set to use the checkpoint bucket")?;
    let encoded = std::env::var(KEY_ENV).map_err(|_| format!("{} is not set", KEY_ENV))?;
    let key = BaseKey::from_encoded(&encoded)?;

    let backend = Arc::new(OpendalStore::s3(&s3)?);
    let executor = StorageExecutor::new(backend, config.retry_policy()?);
    let identity = CheckpointIdentity::new(config.checkpoint.pipeline_version.clone(), run_id);
    Ok(Some(EncryptedCheckpointStore::new(
        executor,
        key,
        identity,
        config.checkpoint.prefix.clone(),
    )))
}
