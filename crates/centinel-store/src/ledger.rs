// crates/centinel-store/src/ledger.rs
//
// HashLedger: the audit-only `hashes/chain.json` file, a JSON array of
// `ChainEntry` in write order. Entries are appended and never rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use centinel_core::error::CentinelError;
use centinel_core::snapshot::ChainEntry;

use crate::fsutil::write_atomic;

pub const LEDGER_DIR: &str = "hashes";
pub const LEDGER_FILE: &str = "chain.json";

#[derive(Debug, Clone)]
pub struct HashLedger {
    path: PathBuf,
}

impl HashLedger {
    /// Ledger rooted at `<root>/hashes/chain.json`.
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(LEDGER_DIR).join(LEDGER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in write order. A missing ledger is empty; an unreadable
    /// one is an error.
    pub fn entries(&self) -> Result<Vec<ChainEntry>, CentinelError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read(&self.path)?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&raw).map_err(|e| {
            CentinelError::InvalidState(format!(
                "hash ledger {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Hash of the most recent entry.
    pub fn tail_hash(&self) -> Result<Option<String>, CentinelError> {
        Ok(self.entries()?.pop().map(|entry| entry.hash))
    }

    pub fn append(&self, entry: ChainEntry) -> Result<(), CentinelError> {
        let mut entries = self.entries()?;
        entries.push(entry);
        let body = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.path, &body)?;
        tracing::debug!(path = %self.path.display(), count = entries.len(), "Hash ledger appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, prev: Option<&str>) -> ChainEntry {
        ChainEntry {
            timestamp: "2025-01-01T00:00:00.000000Z".into(),
            hash: hash.into(),
            previous_hash: prev.map(str::to_string),
            snapshot_path: "snapshots/2025/01/01/00-00-00".into(),
        }
    }

    #[test]
    fn test_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::new(dir.path());
        assert!(ledger.entries().unwrap().is_empty());
        assert_eq!(ledger.tail_hash().unwrap(), None);
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::new(dir.path());
        ledger.append(entry("aa", None)).unwrap();
        ledger.append(entry("bb", Some("aa"))).unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].previous_hash.as_deref(), Some("aa"));
        assert_eq!(ledger.tail_hash().unwrap().as_deref(), Some("bb"));
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = HashLedger::new(dir.path());
        fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        fs::write(ledger.path(), b"[{\"hash\":").unwrap();
        assert!(matches!(ledger.entries(), Err(CentinelError::InvalidState(_))));
        assert!(ledger.append(entry("cc", None)).is_err());
    }
}
