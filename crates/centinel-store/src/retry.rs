// crates/centinel-store/src/retry.rs
//
// StorageExecutor: every object-store call made by the checkpoint store goes
// through here.
//
//   - At most `max_in_flight` calls run at once (semaphore).
//   - Each attempt is bounded by `op_timeout`; a timeout counts as transient.
//   - Transient failures are retried up to `max_attempts` times with
//     exponential backoff `base_delay * 2^(attempt-1)`. The permit is
//     released before sleeping, and the sleep suspends only the calling task.
//   - Permanent failures are returned immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use centinel_core::error::{CheckpointError, StorageError};
use centinel_core::traits::ObjectStore;

/// Retry, timeout and concurrency limits for storage calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub op_timeout: Duration,
    pub max_in_flight: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            op_timeout: Duration::from_secs(15),
            max_in_flight: 4,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt after `attempt` (1-based) failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Bounded, retrying front for an `ObjectStore`.
#[derive(Clone)]
pub struct StorageExecutor {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl StorageExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_in_flight.max(1)));
        Self {
            store,
            policy,
            permits,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), CheckpointError> {
        self.run("put", key, || self.store.put(key, body.clone())).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        self.run("get", key, || self.store.get(key)).await
    }

    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        self.run("list", prefix, || self.store.list(prefix)).await
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, mut call: F) -> Result<T, CheckpointError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| CheckpointError::Storage("storage executor closed".to_string()))?;
                tokio::time::timeout(self.policy.op_timeout, call()).await
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => StorageError::Transient(format!(
                    "{} timed out after {:?}",
                    op, self.policy.op_timeout
                )),
            };

            if !err.is_transient() {
                tracing::error!(op, key, error = %err, "Storage operation failed permanently");
                return Err(CheckpointError::Storage(err.to_string()));
            }

            last_error = err.to_string();
            if attempt < max_attempts {
                let delay = self.policy.backoff(attempt);
                tracing::warn!(
                    op,
                    key,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            op,
            key,
            attempts = max_attempts,
            error = %last_error,
            "Storage retries exhausted"
        );
        Err(CheckpointError::Storage(format!(
            "{} {} failed after {} attempts: {}",
            op, key, max_attempts, last_error
        )))
    }
}
