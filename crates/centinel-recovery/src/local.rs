// crates/centinel-recovery/src/local.rs
//
// LocalCheckpointDir: plain-JSON checkpoints under `<storage>/checkpoints/`.
//
// Candidates are `checkpoint.json` plus any `checkpoint*.json` and
// `checkpoint*.bak`, newest modification time first. A file may carry a
// `checksum` field: SHA-256 hex of the canonical JSON of every other field.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use centinel_core::canonical::checksum_excluding;
use centinel_core::error::CheckpointError;
use centinel_store::fsutil::write_atomic;

use crate::source::{CheckpointCandidate, CheckpointRecord, CheckpointSource, LoadOutcome, LoadedCheckpoint};

pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const PRIMARY_FILE: &str = "checkpoint.json";
pub const BACKUP_FILE: &str = "checkpoint.bak";
pub const CHECKSUM_FIELD: &str = "checksum";

pub const NO_CHECKSUM_WARNING: &str = "Checkpoint without checksum; integrity not fully verified.";

#[derive(Debug, Clone)]
pub struct LocalCheckpointDir {
    dir: PathBuf,
}

impl LocalCheckpointDir {
    /// `<storage_path>/checkpoints`.
    pub fn new(storage_path: &Path) -> Self {
        Self::at(storage_path.join(CHECKPOINT_DIR))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn primary_path(&self) -> PathBuf {
        self.dir.join(PRIMARY_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// Write `record` as the new primary checkpoint, keeping the previous
    /// primary as `checkpoint.bak`.
    pub fn write(&self, record: &CheckpointRecord) -> Result<PathBuf, CheckpointError> {
        let mut payload = match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(CheckpointError::invalid("checkpoint record must serialize to an object")),
            Err(e) => return Err(CheckpointError::invalid(e.to_string())),
        };
        payload.remove(CHECKSUM_FIELD);
        let checksum = checksum_excluding(&payload, CHECKSUM_FIELD)?;
        payload.insert(CHECKSUM_FIELD.to_string(), Value::String(checksum));
        let body = serde_json::to_vec_pretty(&Value::Object(payload))
            .map_err(|e| CheckpointError::invalid(e.to_string()))?;

        let primary = self.primary_path();
        if primary.exists() {
            fs::rename(&primary, self.backup_path()).map_err(|e| CheckpointError::Load(e.to_string()))?;
        }
        write_atomic(&primary, &body)?;
        tracing::info!(path = %primary.display(), "Local checkpoint written");
        Ok(primary)
    }
}

fn read_candidate(path: &Path) -> LoadOutcome {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return LoadOutcome::Missing,
        Err(e) => {
            return LoadOutcome::Corrupt {
                partial: false,
                reason: format!("Failed to read checkpoint: {}", e),
            }
        }
    };

    let data: Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => {
            return LoadOutcome::Corrupt {
                partial: false,
                reason: format!("Checkpoint JSON is invalid: {}", e),
            }
        }
    };
    let Value::Object(map) = data else {
        return LoadOutcome::Corrupt {
            partial: false,
            reason: "Checkpoint must be a JSON object.".to_string(),
        };
    };

    let record = match CheckpointRecord::from_local_map(&map) {
        Ok(record) => record,
        Err(e) => return e.into(),
    };

    let mut warnings = Vec::new();
    match map.get(CHECKSUM_FIELD).and_then(Value::as_str).filter(|s| !s.is_empty()) {
        Some(claimed) => match checksum_excluding(&map, CHECKSUM_FIELD) {
            Ok(expected) if expected.eq_ignore_ascii_case(claimed) => {}
            Ok(_) => {
                return LoadOutcome::Corrupt {
                    partial: true,
                    reason: "Checkpoint checksum mismatch.".to_string(),
                }
            }
            Err(e) => {
                return LoadOutcome::Corrupt {
                    partial: false,
                    reason: e.to_string(),
                }
            }
        },
        None => warnings.push(NO_CHECKSUM_WARNING.to_string()),
    }

    LoadOutcome::Loaded(LoadedCheckpoint { record, warnings })
}

fn is_candidate_name(name: &str) -> bool {
    name.starts_with("checkpoint") && (name.ends_with(".json") || name.ends_with(".bak"))
}

#[async_trait]
impl CheckpointSource for LocalCheckpointDir {
    async fn candidates(&self) -> Result<Vec<CheckpointCandidate>, CheckpointError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || list_candidates(&dir))
            .await
            .map_err(|e| CheckpointError::Load(format!("checkpoint listing task failed: {}", e)))?
    }

    async fn load(&self, candidate: &CheckpointCandidate) -> LoadOutcome {
        let path = candidate.location.clone();
        match tokio::task::spawn_blocking(move || read_candidate(&path)).await {
            Ok(outcome) => outcome,
            Err(e) => LoadOutcome::Corrupt {
                partial: false,
                reason: format!("checkpoint read task failed: {}", e),
            },
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn list_candidates(dir: &Path) -> Result<Vec<CheckpointCandidate>, CheckpointError> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CheckpointError::Load(e.to_string())),
    };

    let mut candidates = Vec::new();
    for item in listing {
        let item = item.map_err(|e| CheckpointError::Load(e.to_string()))?;
        let name = item.file_name().to_string_lossy().into_owned();
        if !is_candidate_name(&name) {
            continue;
        }
        let Ok(meta) = item.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        candidates.push(CheckpointCandidate {
            location: item.path(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    // Newest first; the primary wins a tie.
    candidates.sort_by(|a, b| {
        b.modified.cmp(&a.modified).then_with(|| {
            let a_primary = a.location.ends_with(PRIMARY_FILE);
            let b_primary = b.location.ends_with(PRIMARY_FILE);
            b_primary.cmp(&a_primary).then_with(|| a.location.cmp(&b.location))
        })
    });
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn record(acta: &str, offset: u64) -> CheckpointRecord {
        CheckpointRecord::new(acta, offset, "B1", Utc::now())
    }

    fn touch(path: &Path, age: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn test_missing_dir_has_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        assert!(source.candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_rotates_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        source.write(&record("A1", 5)).unwrap();
        source.write(&record("A2", 10)).unwrap();
        assert!(source.backup_path().exists());

        match source.load(&CheckpointCandidate::new(source.primary_path())).await {
            LoadOutcome::Loaded(loaded) => {
                assert_eq!(loaded.record.acta_id.as_deref(), Some("A2"));
                assert!(loaded.warnings.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        match source.load(&CheckpointCandidate::new(source.backup_path())).await {
            LoadOutcome::Loaded(loaded) => assert_eq!(loaded.record.offset, Some(5)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_candidates_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        source.write(&record("A1", 5)).unwrap();
        source.write(&record("A2", 10)).unwrap();
        fs::write(source.dir().join("checkpoint-old.json"), b"{}").unwrap();
        fs::write(source.dir().join("notes.txt"), b"skip").unwrap();
        touch(&source.dir().join("checkpoint-old.json"), Duration::from_secs(3600));
        touch(&source.backup_path(), Duration::from_secs(60));
        touch(&source.primary_path(), Duration::from_secs(0));

        let names: Vec<String> = source
            .candidates()
            .await
            .unwrap()
            .iter()
            .map(|c| c.location.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["checkpoint.json", "checkpoint.bak", "checkpoint-old.json"]);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        let path = source.write(&record("A1", 5)).unwrap();
        let mut value: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["offset"] = Value::from(6);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert_eq!(
            source.load(&CheckpointCandidate::new(path)).await,
            LoadOutcome::Corrupt {
                partial: true,
                reason: "Checkpoint checksum mismatch.".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unchecksummed_file_loads_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        fs::create_dir_all(source.dir()).unwrap();
        fs::write(
            source.primary_path(),
            br#"{"acta_id":"A9","offset":9,"batch_id":"B9","created_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        match source.load(&CheckpointCandidate::new(source.primary_path())).await {
            LoadOutcome::Loaded(loaded) => assert_eq!(loaded.warnings, vec![NO_CHECKSUM_WARNING.to_string()]),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_and_vanished_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        fs::create_dir_all(source.dir()).unwrap();
        fs::write(source.primary_path(), b"{corrupt}").unwrap();
        assert!(matches!(
            source.load(&CheckpointCandidate::new(source.primary_path())).await,
            LoadOutcome::Corrupt { partial: false, .. }
        ));
        assert_eq!(
            source.load(&CheckpointCandidate::new(source.backup_path())).await,
            LoadOutcome::Missing
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_concurrent_loads_share_one_worker() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalCheckpointDir::new(dir.path());
        source.write(&record("A1", 1)).unwrap();
        source.write(&record("A2", 2)).unwrap();

        let candidates = source.candidates().await.unwrap();
        assert_eq!(candidates.len(), 2);
        let (first, second, listed) = tokio::join!(
            source.load(&candidates[0]),
            source.load(&candidates[1]),
            source.candidates(),
        );
        assert!(matches!(first, LoadOutcome::Loaded(_)));
        assert!(matches!(second, LoadOutcome::Loaded(_)));
        assert_eq!(listed.unwrap().len(), 2);
    }
}
