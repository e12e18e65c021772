// crates/centinel-recovery/tests/chaos.rs
//
// Chaos acceptance tests for checkpoint-based auto-resume.
//
// A harness pipeline processes 100 units, checkpointing every 5 into the
// encrypted store (opendal in-memory backend behind a fault-injecting
// wrapper). A failure is injected, the process state is dropped, and a fresh
// pipeline must resume within 120 seconds:
//   - the resumed unit count is within one checkpoint interval of the
//     pre-failure count;
//   - the hash sequence up to the resume point is byte-for-byte identical.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use centinel_core::chain::chain_hash;
use centinel_core::checkpoint::{CheckpointDraft, CheckpointEnvelope, CheckpointIdentity, RuleState};
use centinel_core::crypto::{self, BaseKey};
use centinel_core::error::{CheckpointError, StorageError};
use centinel_core::recovery::{DecisionKind, RecoveryDecision};
use centinel_core::traits::ObjectStore;
use centinel_recovery::{EncryptedCheckpointSource, RecoveryEngine, RecoverySettings};
use centinel_store::{EncryptedCheckpointStore, OpendalStore, RetryPolicy, StorageExecutor};

const CHECKPOINT_INTERVAL: u64 = 5;
const RESTART_BUDGET: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Object store wrapper that can simulate outages.
struct FlakyStore {
    inner: Arc<OpendalStore>,
    /// Fail this many upcoming puts with a transient error.
    transient_puts: AtomicU32,
    /// Every call fails transiently (network partition).
    partitioned: AtomicBool,
    /// Gets fail transiently while listing still works.
    reads_partitioned: AtomicBool,
    /// Puts fail permanently (disk/bucket full).
    full: AtomicBool,
    puts: AtomicU32,
    gets: AtomicU32,
}

impl FlakyStore {
    fn new(inner: Arc<OpendalStore>) -> Self {
        Self {
            inner,
            transient_puts: AtomicU32::new(0),
            partitioned: AtomicBool::new(false),
            reads_partitioned: AtomicBool::new(false),
            full: AtomicBool::new(false),
            puts: AtomicU32::new(0),
            gets: AtomicU32::new(0),
        }
    }

    fn heal(&self) {
        self.transient_puts.store(0, Ordering::SeqCst);
        self.partitioned.store(false, Ordering::SeqCst);
        self.reads_partitioned.store(false, Ordering::SeqCst);
        self.full.store(false, Ordering::SeqCst);
    }

    fn check_partition(&self) -> Result<(), StorageError> {
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(StorageError::Transient("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_partition()?;
        if self.full.load(Ordering::SeqCst) {
            return Err(StorageError::Permanent("no space left on device".into()));
        }
        let pending = self.transient_puts.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_puts.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::Transient("503 slow down".into()));
        }
        self.inner.put(key, body).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_partition()?;
        if self.reads_partitioned.load(Ordering::SeqCst) {
            return Err(StorageError::Transient("read timed out".into()));
        }
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_partition()?;
        self.inner.list(prefix).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Env {
    raw: Arc<OpendalStore>,
    flaky: Arc<FlakyStore>,
    store: Arc<EncryptedCheckpointStore>,
}

impl Env {
    fn new() -> Self {
        let raw = Arc::new(OpendalStore::memory().unwrap());
        let flaky = Arc::new(FlakyStore::new(raw.clone()));
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(2),
            op_timeout: Duration::from_secs(15),
            max_in_flight: 4,
        };
        let executor = StorageExecutor::new(flaky.clone(), policy);
        let store = Arc::new(EncryptedCheckpointStore::new(
            executor,
            BaseKey::from_bytes(&[42u8; 32]).unwrap(),
            CheckpointIdentity::new("v1.0.0", "chaos-run"),
            "chaos",
        ));
        Self { raw, flaky, store }
    }

    fn engine(&self) -> RecoveryEngine {
        RecoveryEngine::new(
            Arc::new(EncryptedCheckpointSource::new(self.store.clone())),
            RecoverySettings::default(),
        )
    }
}

/// Deterministic stand-in for the collector: unit `n` has content `acta-n`,
/// chained to unit `n-1`.
struct Pipeline {
    store: Arc<EncryptedCheckpointStore>,
    hashes: Vec<String>,
}

impl Pipeline {
    fn fresh(store: Arc<EncryptedCheckpointStore>) -> Self {
        Self {
            store,
            hashes: Vec::new(),
        }
    }

    fn processed(&self) -> u64 {
        self.hashes.len() as u64
    }

    async fn process_until(&mut self, target: u64) -> Result<(), CheckpointError> {
        while self.processed() < target {
            let n = self.processed() + 1;
            let content = format!("acta-{n}");
            let hash = chain_hash(content.as_bytes(), self.hashes.last().map(String::as_str), None, None);
            self.hashes.push(hash);
            if n % CHECKPOINT_INTERVAL == 0 {
                self.checkpoint().await?;
            }
        }
        Ok(())
    }

    async fn checkpoint(&self) -> Result<String, CheckpointError> {
        let n = self.processed();
        let mut draft = CheckpointDraft {
            accumulated_hash_chain: self.hashes.last().cloned(),
            rule_states: Some([("benford".to_string(), RuleState::ok())].into_iter().collect()),
            last_acta_id: Some(format!("acta-{n}")),
            last_hash: self.hashes.last().cloned(),
            current_offset: Some(n),
            batch_id: Some(format!("B{}", n / CHECKPOINT_INTERVAL)),
            ..Default::default()
        };
        draft.extra.insert("unit_hashes".into(), json!(self.hashes));
        self.store.save_checkpoint(draft).await
    }

    /// Restart: ask the engine, then rebuild state from the chosen
    /// checkpoint.
    async fn restart(env: &Env) -> (RecoveryDecision, Pipeline) {
        let decision = env.engine().recover().await;
        let mut pipeline = Pipeline::fresh(env.store.clone());
        if decision.decision_kind == DecisionKind::ContinueFromLastActa {
            let key = decision
                .checkpoint_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap();
            let state = env.store.load_key(&key).await.unwrap().unwrap();
            pipeline.hashes = serde_json::from_value(state.extra["unit_hashes"].clone()).unwrap();
            assert_eq!(state.cursor.current_offset(), Some(pipeline.processed()));
            assert_eq!(decision.offset, Some(pipeline.processed()));
        }
        (decision, pipeline)
    }
}

fn reference_hashes(n: u64) -> Vec<String> {
    let mut hashes: Vec<String> = Vec::new();
    for i in 1..=n {
        let content = format!("acta-{i}");
        let hash = chain_hash(content.as_bytes(), hashes.last().map(String::as_str), None, None);
        hashes.push(hash);
    }
    hashes
}

/// Resume checks shared by every recoverable scenario.
async fn assert_resumes(env: &Env, before: &[String]) -> Pipeline {
    let (decision, mut resumed) = tokio::time::timeout(RESTART_BUDGET, Pipeline::restart(env))
        .await
        .expect("restart exceeded budget");
    assert_eq!(
        decision.decision_kind,
        DecisionKind::ContinueFromLastActa,
        "{}",
        decision.reason
    );

    let delta = before.len() as u64 - resumed.processed();
    assert!(delta <= CHECKPOINT_INTERVAL, "resume delta {delta}");
    assert_eq!(resumed.hashes[..], before[..resumed.hashes.len()]);

    resumed.process_until(120).await.unwrap();
    assert_eq!(resumed.hashes, reference_hashes(120));
    resumed
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_kill_9_resumes_within_one_interval() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(100).await.unwrap();
    pipeline.process_until(103).await.unwrap();
    let before = pipeline.hashes.clone();
    drop(pipeline); // no shutdown hook runs

    assert_resumes(&env, &before).await;
}

#[tokio::test]
async fn test_docker_stop_checkpoints_on_shutdown() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(102).await.unwrap();
    pipeline.checkpoint().await.unwrap();
    let before = pipeline.hashes.clone();
    drop(pipeline);

    let resumed = assert_resumes(&env, &before).await;
    assert_eq!(resumed.processed(), 120);
}

#[tokio::test]
async fn test_transient_bucket_failures_are_absorbed() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(95).await.unwrap();
    env.flaky.transient_puts.store(3, Ordering::SeqCst);
    pipeline.process_until(100).await.unwrap();
    let before = pipeline.hashes.clone();
    drop(pipeline);

    let (decision, resumed) = Pipeline::restart(&env).await;
    assert_eq!(decision.offset, Some(100));
    assert_eq!(resumed.hashes, before);
}

#[tokio::test]
async fn test_network_partition_exhausts_retries_then_resumes() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(100).await.unwrap();

    env.flaky.partitioned.store(true, Ordering::SeqCst);
    let puts_before = env.flaky.puts.load(Ordering::SeqCst);
    let err = pipeline.process_until(105).await.unwrap_err();
    assert!(matches!(err, CheckpointError::Storage(_)));
    assert_eq!(env.flaky.puts.load(Ordering::SeqCst) - puts_before, 5);
    let before = pipeline.hashes.clone();
    drop(pipeline);

    // Still partitioned: no checkpoint reachable, start over with an alert.
    let blind = env.engine().recover().await;
    assert_eq!(blind.decision_kind, DecisionKind::StartFromBeginning);
    assert!(!blind.alerts.is_empty());

    env.flaky.heal();
    assert_resumes(&env, &before).await;
}

#[tokio::test]
async fn test_partition_after_listing_spends_one_retry_budget() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(100).await.unwrap();
    let before = pipeline.hashes.clone();
    drop(pipeline);

    env.flaky.reads_partitioned.store(true, Ordering::SeqCst);
    let gets_before = env.flaky.gets.load(Ordering::SeqCst);
    let decision = tokio::time::timeout(RESTART_BUDGET, env.engine().recover())
        .await
        .expect("recovery exceeded budget");
    assert_eq!(decision.decision_kind, DecisionKind::StartFromBeginning);
    assert!(decision.reason.contains("storage unavailable"), "{}", decision.reason);
    assert!(!decision.alerts.is_empty());
    // latest plus ten history copies were listed; only the first was tried.
    assert_eq!(env.flaky.gets.load(Ordering::SeqCst) - gets_before, 5);

    env.flaky.heal();
    assert_resumes(&env, &before).await;
}

#[tokio::test]
async fn test_disk_full_fails_fast_and_resumes() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(100).await.unwrap();

    env.flaky.full.store(true, Ordering::SeqCst);
    let puts_before = env.flaky.puts.load(Ordering::SeqCst);
    assert!(pipeline.process_until(105).await.is_err());
    assert_eq!(env.flaky.puts.load(Ordering::SeqCst) - puts_before, 1);
    let before = pipeline.hashes.clone();
    drop(pipeline);

    env.flaky.heal();
    assert_resumes(&env, &before).await;
}

#[tokio::test]
async fn test_corrupt_latest_falls_back_to_history() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(100).await.unwrap();
    let before = pipeline.hashes.clone();
    drop(pipeline);

    env.raw.put(&env.store.latest_key(), b"{corrupt}".to_vec()).await.unwrap();
    assert!(env.store.load_latest_checkpoint().await.is_none());

    let resumed = assert_resumes(&env, &before).await;
    assert_eq!(resumed.processed(), 120);
}

#[tokio::test]
async fn test_every_copy_garbled_starts_over_with_alert() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(20).await.unwrap();

    env.raw.put(&env.store.latest_key(), b"{corrupt}".to_vec()).await.unwrap();
    for key in env.store.list_historical_checkpoints().await.unwrap() {
        env.raw.put(&key, b"{invalid-json".to_vec()).await.unwrap();
    }

    let decision = env.engine().recover().await;
    assert_eq!(decision.decision_kind, DecisionKind::StartFromBeginning);
    assert!(!decision.alerts.is_empty());
}

#[tokio::test]
async fn test_tampered_ciphertext_everywhere_reprocesses() {
    let env = Env::new();
    let mut pipeline = Pipeline::fresh(env.store.clone());
    pipeline.process_until(20).await.unwrap();

    let mut keys = env.store.list_historical_checkpoints().await.unwrap();
    keys.push(env.store.latest_key());
    for key in keys {
        let bytes = env.raw.get(&key).await.unwrap().unwrap();
        let mut envelope: CheckpointEnvelope = serde_json::from_slice(&bytes).unwrap();
        let mut ciphertext = crypto::decode_b64url(&envelope.ciphertext).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x80;
        envelope.ciphertext = crypto::encode_b64url(&ciphertext);
        env.raw.put(&key, serde_json::to_vec(&envelope).unwrap()).await.unwrap();
    }

    let decision = env.engine().recover().await;
    assert_eq!(decision.decision_kind, DecisionKind::ReprocessLastBatch);
    let rejected: Vec<Value> = serde_json::from_value(decision.metadata["rejected"].clone()).unwrap();
    assert_eq!(rejected.len(), 5);
}

#[tokio::test]
async fn test_fresh_run_starts_from_beginning() {
    let env = Env::new();
    let decision = env.engine().recover().await;
    assert_eq!(decision.decision_kind, DecisionKind::StartFromBeginning);
    assert!(!decision.alerts.is_empty());
}
