//! Export command implementation.
//!
//! Writes `clinic_backup_<timestamp>.json` into the output directory (the
//! current directory by default), or prints the document with `--stdout`.
//! Under `--dry-run` nothing is written, not even the default billing catalog.

use crate::cli::Cli;
use crate::cli::commands::open_context;
use crate::error::Result;
use crate::i18n::Message;
use crate::sync::{format_size, render_backup, ExportOptions, ExportStats, Exporter};
use colored::Colorize;
use std::path::Path;

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, a required collection
/// cannot be read, or the file cannot be written.
pub fn execute(cli: &Cli, output: Option<&Path>, stdout: bool, json: bool) -> Result<()> {
    let (mut ctx, store_path) = open_context(cli)?;

    let options = ExportOptions {
        consultation_page_size: ctx.settings.consultation_page_size,
        page_delay: ctx.settings.page_delay(),
        readiness: ctx.settings.readiness(),
        clinic_id: ctx.settings.clinic_id.clone(),
        seed_billing: !crate::is_dry_run(),
        ..ExportOptions::default()
    };
    let mut exporter = Exporter::with_options(&mut ctx.store, options);

    if stdout {
        let outcome = exporter.export()?;
        println!("{}", render_backup(&outcome.document)?);
        return Ok(());
    }

    if crate::is_dry_run() {
        let outcome = exporter.export()?;
        if json {
            let output = serde_json::json!({
                "dry_run": true,
                "store": store_path.display().to_string(),
                "stats": outcome.stats,
                "warnings": outcome.warnings,
            });
            println!("{}", serde_json::to_string(&output)?);
        } else {
            println!("{}", "Dry run: no file written".yellow());
            print_stats(&outcome.stats);
            print_warnings(&outcome.warnings);
        }
        return Ok(());
    }

    let dir = output.unwrap_or_else(|| Path::new("."));
    let (outcome, written) = exporter.export_to_dir(dir)?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "run_id": outcome.run_id,
            "path": written.path.display().to_string(),
            "bytes": written.bytes,
            "checksum": written.checksum,
            "stats": outcome.stats,
            "warnings": outcome.warnings,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", ctx.translator.text(Message::ExportSucceeded).green().bold());
        println!();
        print_stats(&outcome.stats);
        println!();
        println!("  File:     {}", written.path.display());
        println!("  Size:     {}", format_size(written.bytes));
        println!("  SHA256:   {}", written.checksum.dimmed());
        print_warnings(&outcome.warnings);
        println!();
        println!("{}", ctx.translator.text(Message::LiveDataExcluded).dimmed());
    }

    Ok(())
}

fn print_stats(stats: &ExportStats) {
    println!("  Patients:         {}", stats.patients);
    println!(
        "  Consultations:    {} ({} page(s))",
        stats.consultations, stats.consultation_pages
    );
    println!("  Users:            {}", stats.users);
    if stats.seeded_billing {
        println!("  Billing items:    {} (default catalog seeded)", stats.billing_items);
    } else if stats.billing_seed_pending {
        println!("  Billing items:    {} (default catalog, not yet seeded)", stats.billing_items);
    } else {
        println!("  Billing items:    {}", stats.billing_items);
    }
    println!("  Patient packages: {}", stats.patient_packages);
    println!("  Key-value keys:   {}", stats.kv_keys);
    println!("  Total: {} records", stats.total());
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("{}", "Warnings:".yellow().bold());
    for warning in warnings {
        println!("  {warning}");
    }
}
