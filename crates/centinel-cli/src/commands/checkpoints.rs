// crates/centinel-cli/src/commands/checkpoints.rs
//
// `centinel checkpoints [--json]`: list the run's history copies, newest
// first. Forensic only; nothing is decrypted or modified.

use crate::commands::open_checkpoint_store;
use crate::config::CentinelConfig;
use crate::output::{checkpoint_table, render_json, CheckpointRow};

pub async fn run(config: &CentinelConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_checkpoint_store(config)?
        .ok_or("no checkpoint bucket configured ([checkpoint] bucket)")?;
    let keys = store.list_historical_checkpoints().await?;

    let rows: Vec<CheckpointRow> = keys
        .iter()
        .enumerate()
        .map(|(i, key)| CheckpointRow::from_key(i + 1, key))
        .collect();

    if json {
        println!("{}", render_json(&rows));
    } else if rows.is_empty() {
        println!("No checkpoints under {}", store.run_prefix());
    } else {
        println!("{}", checkpoint_table(&rows));
    }
    Ok(())
}
