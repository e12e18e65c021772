// crates/centinel-store/src/checkpoint.rs
//
// Encrypted Checkpoint Store.
//
// Layout under the configured prefix:
//
//   {prefix}/{pipeline_version}/{run_id}/latest.json.enc      (overwritten)
//   {prefix}/{pipeline_version}/{run_id}/{timestamp}.json.enc (never overwritten)
//
// Each object is a JSON `CheckpointEnvelope`. The plaintext is the canonical
// JSON of a validated `CheckpointState`, sealed with a key derived from the
// base key and the envelope's own random IV.
//
// Single writer per (pipeline_version, run_id) is assumed. There is no
// concurrency guard on `latest`: two live writers race with last-write-wins,
// and the supervising process must prevent that.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use centinel_core::canonical::canonical_json;
use centinel_core::checkpoint::{
    validate_payload, CheckpointDraft, CheckpointEnvelope, CheckpointIdentity, CheckpointState,
    ENVELOPE_SCHEMA_VERSION,
};
use centinel_core::crypto::{self, BaseKey};
use centinel_core::error::CheckpointError;

use crate::retry::StorageExecutor;

/// Object name of the overwritten "latest" copy.
pub const LATEST_OBJECT: &str = "latest.json.enc";

/// Suffix shared by every checkpoint object.
pub const CHECKPOINT_SUFFIX: &str = ".json.enc";

/// Upper bound on `list_historical_checkpoints`.
pub const HISTORY_LIMIT: usize = 10;

/// Persists and retrieves encrypted checkpoints for one pipeline run.
pub struct EncryptedCheckpointStore {
    executor: StorageExecutor,
    key: BaseKey,
    identity: CheckpointIdentity,
    prefix: String,
}

impl EncryptedCheckpointStore {
    pub fn new(
        executor: StorageExecutor,
        key: BaseKey,
        identity: CheckpointIdentity,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self {
            executor,
            key,
            identity,
            prefix,
        }
    }

    pub fn identity(&self) -> &CheckpointIdentity {
        &self.identity
    }

    /// Directory-style prefix holding this run's objects, `/`-terminated.
    pub fn run_prefix(&self) -> String {
        let run = format!("{}/{}/", self.identity.pipeline_version, self.identity.run_id);
        if self.prefix.is_empty() {
            run
        } else {
            format!("{}/{}", self.prefix, run)
        }
    }

    pub fn latest_key(&self) -> String {
        format!("{}{}", self.run_prefix(), LATEST_OBJECT)
    }

    pub fn history_key(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}{}{}",
            self.run_prefix(),
            at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            CHECKPOINT_SUFFIX
        )
    }

    /// Validate, encrypt and persist `draft`.
    ///
    /// Returns the envelope's `ciphertext_hash`, which identifies this
    /// checkpoint by content.
    pub async fn save_checkpoint(&self, mut draft: CheckpointDraft) -> Result<String, CheckpointError> {
        let now = Utc::now();
        draft.fill_defaults(&self.identity, now);
        let state = CheckpointState::try_from(draft)?;
        state.ensure_identity(&self.identity)?;

        let envelope = self.seal_state(&state, now)?;
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| CheckpointError::corrupt(format!("envelope serialization failed: {}", e)))?;

        let history_key = self.history_key(now);
        self.executor.put(&history_key, body.clone()).await?;
        self.executor.put(&self.latest_key(), body).await?;

        tracing::info!(
            run_id = %self.identity.run_id,
            key = %history_key,
            ciphertext_hash = %envelope.ciphertext_hash,
            "Checkpoint saved"
        );
        Ok(envelope.ciphertext_hash)
    }

    /// Persist an already-validated state.
    pub async fn save_state(&self, state: &CheckpointState) -> Result<String, CheckpointError> {
        self.save_checkpoint(CheckpointDraft::from(state.clone())).await
    }

    /// Latest checkpoint for this run.
    ///
    /// Absent, undecryptable and invalid checkpoints all come back as `None`;
    /// failures are logged. Use [`load_key`](Self::load_key) to tell them
    /// apart.
    pub async fn load_latest_checkpoint(&self) -> Option<CheckpointState> {
        let key = self.latest_key();
        match self.load_key(&key).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Latest checkpoint unusable");
                None
            }
        }
    }

    /// Fetch and open the checkpoint at `key`. `Ok(None)` means the object
    /// does not exist.
    pub async fn load_key(&self, key: &str) -> Result<Option<CheckpointState>, CheckpointError> {
        match self.executor.get(key).await? {
            Some(bytes) => self.open_envelope(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Check `payload` against the required-key rules and this store's
    /// identity.
    pub fn validate_checkpoint(&self, payload: &Value) -> Result<CheckpointState, CheckpointError> {
        validate_payload(payload, &self.identity)
    }

    /// Up to ten history keys, most recent first.
    pub async fn list_historical_checkpoints(&self) -> Result<Vec<String>, CheckpointError> {
        let mut keys: Vec<String> = self
            .executor
            .list(&self.run_prefix())
            .await?
            .into_iter()
            .filter(|key| key.ends_with(CHECKPOINT_SUFFIX) && !key.ends_with(LATEST_OBJECT))
            .collect();
        // Timestamped names sort chronologically.
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.truncate(HISTORY_LIMIT);
        Ok(keys)
    }

    /// Decode, verify and decrypt a stored envelope.
    ///
    /// A well-formed envelope whose `ciphertext_hash` does not match is
    /// partial corruption. Unparseable envelopes and failed decryption are
    /// total corruption.
    pub fn open_envelope(&self, bytes: &[u8]) -> Result<CheckpointState, CheckpointError> {
        let envelope: CheckpointEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| CheckpointError::corrupt(format!("envelope is not valid JSON: {}", e)))?;

        if envelope.schema_version != ENVELOPE_SCHEMA_VERSION {
            return Err(CheckpointError::invalid(format!(
                "unsupported envelope schema_version {}",
                envelope.schema_version
            )));
        }
        let claimed = CheckpointIdentity::new(envelope.pipeline_version.clone(), envelope.run_id.clone());
        if claimed != self.identity {
            return Err(CheckpointError::invalid(format!(
                "envelope belongs to {}/{}, expected {}/{}",
                claimed.pipeline_version,
                claimed.run_id,
                self.identity.pipeline_version,
                self.identity.run_id
            )));
        }

        let iv = crypto::decode_b64url(&envelope.iv)
            .map_err(|e| CheckpointError::corrupt(format!("bad iv: {}", e)))?;
        if iv.len() != crypto::IV_LEN {
            return Err(CheckpointError::corrupt(format!("iv must be {} bytes, got {}", crypto::IV_LEN, iv.len())));
        }
        let ciphertext = crypto::decode_b64url(&envelope.ciphertext)
            .map_err(|e| CheckpointError::corrupt(format!("bad ciphertext encoding: {}", e)))?;

        // Integrity before decryption.
        let actual = crypto::sha256_hex(&ciphertext);
        if !actual.eq_ignore_ascii_case(&envelope.ciphertext_hash) {
            return Err(CheckpointError::partially_corrupt(format!(
                "ciphertext_hash mismatch: envelope says {}, computed {}",
                envelope.ciphertext_hash, actual
            )));
        }

        let plaintext = crypto::open(&self.key, &iv, &self.identity.aad(), &ciphertext)
            .map_err(|e| CheckpointError::corrupt(e.to_string()))?;
        let payload: Value = serde_json::from_slice(&plaintext)
            .map_err(|e| CheckpointError::corrupt(format!("decrypted payload is not JSON: {}", e)))?;
        self.validate_checkpoint(&payload)
    }

    fn seal_state(&self, state: &CheckpointState, now: DateTime<Utc>) -> Result<CheckpointEnvelope, CheckpointError> {
        let plaintext = canonical_json(state)?;
        let iv = crypto::random_iv();
        let ciphertext = crypto::seal(&self.key, &iv, &self.identity.aad(), &plaintext)?;
        Ok(CheckpointEnvelope {
            schema_version: ENVELOPE_SCHEMA_VERSION,
            pipeline_version: self.identity.pipeline_version.clone(),
            run_id: self.identity.run_id.clone(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            iv: crypto::encode_b64url(&iv),
            ciphertext_hash: crypto::sha256_hex(&ciphertext),
            ciphertext: crypto::encode_b64url(&ciphertext),
        })
    }
}
