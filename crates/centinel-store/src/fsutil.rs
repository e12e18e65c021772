// crates/centinel-store/src/fsutil.rs

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use centinel_core::error::CentinelError;

/// Write `data` to `path` through a sibling temp file and a rename, so
/// readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CentinelError> {
    let parent = path
        .parent()
        .ok_or_else(|| CentinelError::InvalidInput(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| CentinelError::InvalidInput(format!("{} has no file name", path.display())))?;
    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}
