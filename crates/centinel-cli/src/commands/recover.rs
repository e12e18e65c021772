// crates/centinel-cli/src/commands/recover.rs
//
// `centinel recover`: run the Recovery Engine once and print the decision.
// Reads the encrypted bucket when one is configured, otherwise the local
// `<storage>/checkpoints` directory.

use std::sync::Arc;

use centinel_recovery::{CheckpointSource, EncryptedCheckpointSource, LocalCheckpointDir, RecoveryEngine};

use crate::commands::open_checkpoint_store;
use crate::config::CentinelConfig;
use crate::output::render_json;

pub async fn run(config: &CentinelConfig) -> Result<(), Box<dyn std::error::Error>> {
    let source: Arc<dyn CheckpointSource> = match open_checkpoint_store(config)? {
        Some(store) => Arc::new(EncryptedCheckpointSource::new(Arc::new(store))),
        None => Arc::new(LocalCheckpointDir::new(&config.storage_root())),
    };

    let engine = RecoveryEngine::new(source, config.recovery_settings());
    let decision = engine.recover().await;
    println!("{}", render_json(&decision));
    Ok(())
}
