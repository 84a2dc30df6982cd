//! Version command implementation.

use crate::error::Result;
use crate::sync::EXPORT_STEPS;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    /// Progress steps reported by an export.
    export_steps: usize,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        let output = VersionOutput {
            version,
            build,
            export_steps: EXPORT_STEPS,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("clinic-backup {version} ({build})");
    Ok(())
}
