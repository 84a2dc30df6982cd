//! Clinic Backup - export and restore clinic records
//!
//! This crate provides the core functionality for the `clinic-backup` CLI.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Record, BackupDocument, default billing catalog)
//! - [`store`] - Document and key-value store layer (SQLite, in-memory)
//! - [`sync`] - Backup export, restore and reconciliation
//! - [`cache`] - In-memory application cache rebuilt after a restore
//! - [`app`] - Application context and confirmation seam
//! - [`i18n`] - User-facing message catalog
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod i18n;
pub mod model;
pub mod store;
pub mod sync;

pub use error::{Error, Result};

/// Global dry-run flag for `--dry-run`.
///
/// When set, `import` reports what a restore would change without writing,
/// and `export` reports counts without writing a file.
pub static DRY_RUN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if dry-run mode is active.
#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(std::sync::atomic::Ordering::Relaxed)
}
