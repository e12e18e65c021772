// crates/centinel-cli/src/commands/verify.rs
//
// `centinel verify --dir <root> [--rechain]`: offline audit of a snapshot
// tree. Prints the report as JSON; the caller exits non-zero when invalid.

use std::path::Path;

use centinel_verify::{verify_hashchain, VerifyMode};

use crate::output::render_json;

/// Returns whether the chain verified.
pub async fn run(dir: &Path, rechain: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let mode = if rechain { VerifyMode::Rechain } else { VerifyMode::Stored };
    let root = dir.to_path_buf();
    let report = tokio::task::spawn_blocking(move || verify_hashchain(&root, mode)).await??;

    println!("{}", render_json(&report));
    if let Some(divergence) = &report.first_divergence {
        eprintln!(
            "Chain diverges at entry {} ({})",
            divergence.index, divergence.path
        );
    }
    Ok(report.valid)
}
