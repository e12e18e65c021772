// crates/centinel-core/src/error.rs

use thiserror::Error;

/// Collector-wide error types for snapshot, hashing and crypto plumbing.
#[derive(Debug, Error)]
pub enum CentinelError {
    /// Filesystem error while reading or writing snapshots and ledgers.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error (key material, derivation, AEAD).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Input that violates a documented precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistent state that is not in the shape we wrote it in.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for CentinelError {
    fn from(e: serde_json::Error) -> Self {
        CentinelError::Serialization(e.to_string())
    }
}

/// Failure reported by an object store backend.
///
/// `NotFound` is deliberately absent: a missing object is `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Connectivity/transport failure or timeout. Safe to retry.
    #[error("Transient storage error: {0}")]
    Transient(String),

    /// Anything retrying cannot fix (permissions, bad bucket, bad request).
    #[error("Permanent storage error: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// Errors raised by the encrypted checkpoint store and the recovery sources.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Shape or required-field violation. Never retried.
    #[error("Checkpoint validation error: {reason}")]
    Validation {
        reason: String,
        /// Required keys absent from the payload, sorted.
        missing: Vec<String>,
    },

    /// Storage unavailable after the retry budget was exhausted, or a
    /// permanent backend failure.
    #[error("Checkpoint storage error: {0}")]
    Storage(String),

    /// Decryption or parsing failure. `partial` marks a payload that parsed
    /// but failed its integrity check.
    #[error("Checkpoint corrupt (partial={partial}): {reason}")]
    Corrupt { partial: bool, reason: String },

    /// I/O-level read failure for a single candidate.
    #[error("Checkpoint load error: {0}")]
    Load(String),

    /// Base key or derivation failure.
    #[error("Checkpoint crypto error: {0}")]
    Crypto(String),
}

impl CheckpointError {
    /// Build a validation error listing missing keys.
    pub fn missing_keys(mut missing: Vec<String>) -> Self {
        missing.sort();
        missing.dedup();
        CheckpointError::Validation {
            reason: format!("missing required keys: {}", missing.join(", ")),
            missing,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CheckpointError::Validation {
            reason: reason.into(),
            missing: Vec::new(),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        CheckpointError::Corrupt {
            partial: false,
            reason: reason.into(),
        }
    }

    pub fn partially_corrupt(reason: impl Into<String>) -> Self {
        CheckpointError::Corrupt {
            partial: true,
            reason: reason.into(),
        }
    }
}

impl From<CentinelError> for CheckpointError {
    fn from(e: CentinelError) -> Self {
        match e {
            CentinelError::Crypto(msg) => CheckpointError::Crypto(msg),
            CentinelError::Io(err) => CheckpointError::Load(err.to_string()),
            CentinelError::Serialization(msg) => CheckpointError::corrupt(msg),
            CentinelError::InvalidInput(msg) | CentinelError::InvalidState(msg) => {
                CheckpointError::invalid(msg)
            }
        }
    }
}
