//! GitHub Actions file commands
//!
//! Outputs, exported environment and saved state are appended to the files
//! named by `GITHUB_OUTPUT`, `GITHUB_ENV` and `GITHUB_STATE` using the
//! multiline `name<<DELIMITER` syntax, so values may contain newlines.

use crate::error::{VolcacheError, VolcacheResult};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Render one `name<<delimiter` record
pub fn format_command(name: &str, value: &str, delimiter: &str) -> String {
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}

fn fresh_delimiter(value: &str) -> String {
    loop {
        let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
        if !value.contains(&delimiter) {
            return delimiter;
        }
    }
}

/// Append a record to a file command
pub async fn append_command(file: &Path, name: &str, value: &str) -> VolcacheResult<()> {
    let record = format_command(name, value, &fresh_delimiter(value));

    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .await
        .map_err(|e| VolcacheError::io(format!("opening {}", file.display()), e))?;

    handle
        .write_all(record.as_bytes())
        .await
        .map_err(|e| VolcacheError::io(format!("writing {}", file.display()), e))?;
    handle
        .flush()
        .await
        .map_err(|e| VolcacheError::io(format!("flushing {}", file.display()), e))
}
