//! Backup file operations.
//!
//! Backups are written atomically (temp file, fsync, rename) so an
//! interrupted export never leaves a truncated file behind under the final
//! name. Reads map every failure to [`SyncError::Parse`]: an unreadable
//! backup is treated the same as a malformed one.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::model::BackupDocument;
use crate::sync::hash::bytes_hash;
use crate::sync::types::{SyncError, SyncResult};

/// Prefix shared by every backup file name.
pub const BACKUP_FILE_PREFIX: &str = "clinic_backup_";

/// A backup that has been written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct WrittenBackup {
    /// Final path of the file.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
    /// Hex SHA256 of the file contents.
    pub checksum: String,
}

/// File name for a backup taken at `at`.
///
/// The timestamp is ISO 8601 with millisecond precision, with `:` and `.`
/// replaced by `-` so the name is portable: `clinic_backup_2024-03-05T09-08-07-123Z.json`.
#[must_use]
pub fn backup_filename(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{BACKUP_FILE_PREFIX}{stamp}.json")
}

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Serialize a backup as pretty-printed JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_backup(document: &BackupDocument) -> SyncResult<String> {
    Ok(document.to_json_pretty()?)
}

/// Write a backup into `dir` under its timestamped name.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_backup(
    dir: &Path,
    document: &BackupDocument,
    at: DateTime<Utc>,
) -> SyncResult<WrittenBackup> {
    let content = render_backup(document)?;
    let path = dir.join(backup_filename(at));
    atomic_write(&path, &content)?;

    Ok(WrittenBackup {
        bytes: content.len() as u64,
        checksum: bytes_hash(content.as_bytes()),
        path,
    })
}

/// Read and parse a backup file.
///
/// # Errors
///
/// Returns [`SyncError::Parse`] if the file cannot be read or is not a
/// backup document.
pub fn read_backup(path: &Path) -> SyncResult<BackupDocument> {
    let text = fs::read_to_string(path)
        .map_err(|e| SyncError::Parse(format!("{}: {e}", path.display())))?;
    parse_backup(&text)
}

/// Parse backup text.
///
/// # Errors
///
/// Returns [`SyncError::Parse`] if the text is not a backup document.
pub fn parse_backup(text: &str) -> SyncResult<BackupDocument> {
    BackupDocument::from_json_str(text).map_err(|e| SyncError::Parse(e.to_string()))
}

/// Checksum of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_checksum(path: &Path) -> SyncResult<String> {
    Ok(bytes_hash(&fs::read(path)?))
}

/// Size of a file in bytes, 0 if it doesn't exist.
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
