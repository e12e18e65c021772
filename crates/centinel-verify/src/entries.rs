// crates/centinel-verify/src/entries.rs

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use centinel_core::error::CentinelError;
use centinel_core::snapshot::{SnapshotMetadata, HASH_FILE, METADATA_FILE, RAW_FILE, SNAPSHOTS_DIR};

/// One snapshot directory found on disk.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub dir: PathBuf,
    /// Path relative to the audited root, `/`-separated.
    pub relative: String,
    /// `timestamp_utc` from the metadata, when it could be read and parsed.
    pub timestamp: Option<DateTime<Utc>>,
}

impl SnapshotEntry {
    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(RAW_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn hash_path(&self) -> PathBuf {
        self.dir.join(HASH_FILE)
    }

    pub fn read_metadata(&self) -> Result<SnapshotMetadata, CentinelError> {
        let raw = fs::read(self.metadata_path())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn read_stored_hash(&self) -> Result<String, CentinelError> {
        Ok(fs::read_to_string(self.hash_path())?.trim().to_string())
    }
}

/// Every directory under `<root>/snapshots` holding a `snapshot.raw`,
/// ordered by embedded timestamp. Entries without a usable timestamp sort
/// last, by path. Symlinks are not followed.
pub fn collect_snapshot_entries(root: &Path) -> Result<Vec<SnapshotEntry>, CentinelError> {
    let base = root.join(SNAPSHOTS_DIR);
    let mut dirs = Vec::new();
    if base.is_dir() {
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && entry.file_name() == RAW_FILE {
                if let Some(dir) = entry.path().parent() {
                    dirs.push(dir.to_path_buf());
                }
            }
        }
    }

    let mut entries: Vec<SnapshotEntry> = dirs
        .into_iter()
        .map(|dir| {
            let relative = dir
                .strip_prefix(root)
                .unwrap_or(&dir)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let mut entry = SnapshotEntry {
                dir,
                relative,
                timestamp: None,
            };
            entry.timestamp = entry
                .read_metadata()
                .ok()
                .and_then(|meta| DateTime::parse_from_rfc3339(&meta.timestamp_utc).ok())
                .map(|ts| ts.with_timezone(&Utc));
            entry
        })
        .collect();

    entries.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.relative.cmp(&b.relative)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.relative.cmp(&b.relative),
    });
    Ok(entries)
}
