// crates/centinel-recovery/src/remote.rs
//
// EncryptedCheckpointSource: feeds the Recovery Engine from the encrypted
// object store. The `latest` object is tried first, then the history copies
// newest first, so a damaged `latest` falls back to the last good save.

use std::sync::Arc;

use async_trait::async_trait;

use centinel_core::error::CheckpointError;
use centinel_store::checkpoint::EncryptedCheckpointStore;

use crate::source::{CheckpointCandidate, CheckpointRecord, CheckpointSource, LoadOutcome, LoadedCheckpoint};

pub struct EncryptedCheckpointSource {
    store: Arc<EncryptedCheckpointStore>,
}

impl EncryptedCheckpointSource {
    pub fn new(store: Arc<EncryptedCheckpointStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EncryptedCheckpointStore {
        &self.store
    }
}

#[async_trait]
impl CheckpointSource for EncryptedCheckpointSource {
    async fn candidates(&self) -> Result<Vec<CheckpointCandidate>, CheckpointError> {
        let mut candidates = vec![CheckpointCandidate::new(self.store.latest_key())];
        candidates.extend(
            self.store
                .list_historical_checkpoints()
                .await?
                .into_iter()
                .map(CheckpointCandidate::new),
        );
        Ok(candidates)
    }

    async fn load(&self, candidate: &CheckpointCandidate) -> LoadOutcome {
        let key = candidate.location.to_string_lossy();
        match self.store.load_key(&key).await {
            Ok(Some(state)) => LoadOutcome::Loaded(LoadedCheckpoint {
                record: CheckpointRecord::from_state(&state),
                warnings: Vec::new(),
            }),
            Ok(None) => LoadOutcome::Missing,
            Err(e) => e.into(),
        }
    }

    fn describe(&self) -> String {
        self.store.run_prefix()
    }
}
