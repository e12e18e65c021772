// crates/centinel-cli/src/output.rs
//
// Rendering for CLI results: JSON for scripts and alerting hooks, a table
// for the checkpoint history.

use serde::Serialize;
use tabled::{Table, Tabled};

/// One row of `centinel checkpoints`.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct CheckpointRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Saved at")]
    pub saved_at: String,
    #[tabled(rename = "Key")]
    pub key: String,
}

impl CheckpointRow {
    /// History keys end in `<timestamp>.json.enc`.
    pub fn from_key(position: usize, key: &str) -> Self {
        let name = key.rsplit('/').next().unwrap_or(key);
        let saved_at = name.strip_suffix(".json.enc").unwrap_or(name).to_string();
        Self {
            position,
            saved_at,
            key: key.to_string(),
        }
    }
}

pub fn checkpoint_table(rows: &[CheckpointRow]) -> String {
    Table::new(rows).to_string()
}

/// Pretty JSON; serialization failures are reported inline.
pub fn render_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}
