//! Status command implementation.
//!
//! Shows where the store lives, whether it is ready, how many documents each
//! collection holds and which key-value keys exist.

use crate::cli::Cli;
use crate::cli::commands::open_context;
use crate::error::Result;
use crate::sync::{file_size, format_size, get_store_status, print_status};

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the store is not initialized or cannot be read.
pub fn execute(cli: &Cli, json: bool) -> Result<()> {
    let (ctx, path) = open_context(cli)?;
    let status = get_store_status(&ctx.store, ctx.settings.clinic_id.as_deref())?;

    if json {
        let output = serde_json::json!({
            "store": path.display().to_string(),
            "size": file_size(&path),
            "clinic_id": ctx.settings.clinic_id,
            "lang": ctx.settings.lang,
            "status": status,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        let location = format!("{} ({})", path.display(), format_size(file_size(&path)));
        print_status(&status, &location);
        if let Some(clinic) = &ctx.settings.clinic_id {
            println!();
            println!("Clinic: {clinic}");
        }
    }

    Ok(())
}
