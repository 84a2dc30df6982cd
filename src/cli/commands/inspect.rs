//! Inspect command implementation.
//!
//! Reads a backup file and reports what a restore would bring in, without
//! opening the store.

use crate::error::{Error, Result};
use crate::sync::{parse_backup, print_summary, summarize_backup, SyncError};
use std::fs;
use std::path::Path;

/// Execute the inspect command.
///
/// # Errors
///
/// Returns an error if the file is missing or is not a backup document.
pub fn execute(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        return Err(Error::BackupNotFound {
            path: file.to_path_buf(),
        });
    }

    let text = fs::read_to_string(file)
        .map_err(|e| SyncError::Parse(format!("{}: {e}", file.display())))?;
    let document = parse_backup(&text)?;
    let summary = summarize_backup(&document, &text);

    if json {
        let output = serde_json::json!({
            "path": file.display().to_string(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_summary(&summary, &file.display().to_string());
    }

    Ok(())
}
