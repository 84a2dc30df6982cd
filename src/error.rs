//! Error types for the clinic-backup CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, 6=sync, ...)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;
use crate::sync::SyncError;

/// Result type alias for clinic-backup operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    AlreadyInitialized,
    StoreError,

    // Not Found (exit 3)
    BackupNotFound,

    // Validation (exit 4)
    InvalidBackup,
    InvalidArgument,

    // Sync (exit 6)
    ExportFailed,
    RestoreIncomplete,
    Cancelled,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::StoreError => "STORE_ERROR",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::InvalidBackup => "INVALID_BACKUP",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ExportFailed => "EXPORT_FAILED",
            Self::RestoreIncomplete => "RESTORE_INCOMPLETE",
            Self::Cancelled => "CANCELLED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::StoreError => 2,
            Self::BackupNotFound => 3,
            Self::InvalidBackup | Self::InvalidArgument => 4,
            Self::ExportFailed | Self::RestoreIncomplete | Self::Cancelled => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether running the same command again may succeed.
    ///
    /// True for store hiccups and partial restores: a restore is idempotent,
    /// so rerunning it converges. False for bad input and cancellations.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreError | Self::ExportFailed | Self::RestoreIncomplete
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in clinic-backup operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store not initialized at {path}")]
    NotInitialized { path: PathBuf },

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Backup file not found: {path}")]
    BackupNotFound { path: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::BackupNotFound { .. } => ErrorCode::BackupNotFound,
            Self::Store(_) => ErrorCode::StoreError,
            Self::Sync(err) => match err {
                SyncError::Store(_) => ErrorCode::StoreError,
                SyncError::Parse(_) => ErrorCode::InvalidBackup,
                SyncError::Fetch { .. } => ErrorCode::ExportFailed,
                SyncError::Cancelled => ErrorCode::Cancelled,
                SyncError::PartialRestore { .. } => ErrorCode::RestoreIncomplete,
                SyncError::Io(_) => ErrorCode::IoError,
                SyncError::Json(_) => ErrorCode::JsonError,
            },
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { .. } => {
                Some("Run `clinic-backup init` to create the store".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Store already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::BackupNotFound { .. } => Some(
                "Backups are named clinic_backup_<timestamp>.json. \
                 Use `clinic-backup export` to create one."
                    .to_string(),
            ),

            Self::Sync(SyncError::Parse(_)) => Some(
                "The file must be a JSON object as written by `clinic-backup export`. \
                 Use `clinic-backup inspect <file>` to check it."
                    .to_string(),
            ),

            Self::Sync(SyncError::PartialRestore { .. }) => Some(
                "Steps that succeeded were applied. Fix the cause and run the same \
                 import again; a restore converges when repeated."
                    .to_string(),
            ),

            Self::Sync(SyncError::Cancelled) => {
                Some("Pass `--yes` to restore without the confirmation prompt".to_string())
            }

            Self::Config(_) => Some(
                "Check ~/.clinic-backup/config.json, or delete it to fall back to defaults"
                    .to_string(),
            ),

            Self::InvalidArgument(msg) if msg.contains("lang") => {
                Some("Valid languages: zh, en".to_string())
            }

            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. A partial restore also carries its report.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        if let Self::Sync(SyncError::PartialRestore { report, .. }) = self {
            if let Ok(report) = serde_json::to_value(report) {
                obj["error"]["report"] = report;
            }
        }

        obj
    }
}
