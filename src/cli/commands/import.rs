//! Import command implementation.
//!
//! Asks for confirmation (unless `--yes`), restores the backup step by step
//! with a progress bar on stderr, and reports per-step outcomes. With
//! `--dry-run` it prints what each collection would gain and lose instead.

use crate::app::{AutoConfirm, Confirmer};
use crate::cli::Cli;
use crate::cli::commands::open_context;
use crate::error::{Error, Result};
use crate::i18n::Message;
use crate::sync::{read_backup, ImportOptions, ImportPlan, ImportReport, Importer, SyncError};
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

const BAR_WIDTH: usize = 24;

/// Asks on stderr and reads the answer from stdin.
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&mut self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N] ");
        // An unflushed prompt still gets answered.
        io::stderr().flush().ok();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "是")
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, the user declines, or
/// any restore step fails.
pub fn execute(cli: &Cli, file: &Path, normalize: bool, json: bool) -> Result<()> {
    if !file.exists() {
        return Err(Error::BackupNotFound {
            path: file.to_path_buf(),
        });
    }

    let (mut ctx, _) = open_context(cli)?;

    if crate::is_dry_run() {
        let document = read_backup(file)?;
        let options = ImportOptions {
            normalize_consultations: normalize,
            ..ImportOptions::default()
        };
        let plan = Importer::for_context(&mut ctx).configure(options).plan(&document)?;
        if json {
            let output = serde_json::json!({ "dry_run": true, "plan": plan });
            println!("{}", serde_json::to_string(&output)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let show_bar = !json && !cli.quiet && io::stderr().is_terminal();
    let mut options = ImportOptions {
        normalize_consultations: normalize,
        ..ImportOptions::default()
    };
    if show_bar {
        options = options.with_progress(|done: usize, total: usize| {
            eprint!("\r{}", progress_bar(done, total));
            if done >= total {
                eprintln!();
            }
        });
    }

    let mut confirmer: Box<dyn Confirmer> = if cli.yes {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(StdinConfirmer)
    };

    let result = Importer::for_context(&mut ctx)
        .configure(options)
        .import_file(file, confirmer.as_mut());

    match result {
        Ok(report) => {
            if json {
                let output = serde_json::json!({ "success": true, "report": report });
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("{}", ctx.translator.text(Message::ImportSucceeded).green().bold());
                println!();
                print_report(&report);
            }
            Ok(())
        }
        Err(SyncError::PartialRestore { failed, report }) => {
            if !json {
                println!("{}", ctx.translator.text(Message::ImportPartial).yellow().bold());
                println!();
                print_report(&report);
            }
            Err(SyncError::PartialRestore { failed, report }.into())
        }
        Err(SyncError::Cancelled) => {
            if !json {
                println!("{}", ctx.translator.text(Message::ImportCancelled).dimmed());
            }
            Err(SyncError::Cancelled.into())
        }
        Err(e @ SyncError::Parse(_)) => {
            if !json {
                eprintln!("{}", ctx.translator.text(Message::BackupUnreadable).red());
            }
            Err(e.into())
        }
        Err(e) => {
            if !json {
                eprintln!("{}", ctx.translator.text(Message::ImportFailed).red());
            }
            Err(e.into())
        }
    }
}

/// Render `done / total` as a fixed-width bar.
fn progress_bar(done: usize, total: usize) -> String {
    let total = total.max(1);
    let done = done.min(total);
    let filled = done * BAR_WIDTH / total;
    format!(
        "[{}{}] {done}/{total}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

fn print_report(report: &ImportReport) {
    println!("{}", "Steps:".blue().bold());
    for step in &report.steps {
        let counts = format!(
            "{} upserted, {} deleted, {} skipped",
            step.stats.upserted, step.stats.deleted, step.stats.skipped
        );
        match &step.error {
            None => println!("  {} {:<16} {}", "✓".green(), step.step, counts.dimmed()),
            Some(error) => println!("  {} {:<16} {}", "✗".red(), step.step, error.red()),
        }
    }
    if !report.kv_denylisted.is_empty() {
        println!(
            "  {}",
            format!("ignored live keys: {}", report.kv_denylisted.join(", ")).dimmed()
        );
    }
    println!();
    println!(
        "  Total: {} upserted, {} deleted",
        report.total_upserted(),
        report.total_deleted()
    );
    if !report.persisted.is_empty() {
        println!("  Cache files:");
        for path in &report.persisted {
            println!("    {path}");
        }
    }
}

fn print_plan(plan: &ImportPlan) {
    println!("{}", "Dry run: nothing written".yellow());
    println!();
    println!("{}", "Collections:".blue().bold());
    for collection in &plan.collections {
        let line = format!(
            "  {:<28} -{} +{} ~{} ={}",
            collection.collection,
            collection.to_delete,
            collection.to_create,
            collection.to_update,
            collection.unchanged
        );
        if collection.has_changes() {
            println!("{line}");
        } else {
            println!("{}", line.dimmed());
        }
        if collection.skipped > 0 {
            println!(
                "  {}",
                format!("{} record(s) without an id would be skipped", collection.skipped).dimmed()
            );
        }
    }
    if !plan.kv_paths.is_empty() {
        println!();
        println!("{}", "Key-value paths:".blue().bold());
        for path in &plan.kv_paths {
            println!("  {path}");
        }
    }
    if !plan.kv_denylisted.is_empty() {
        println!(
            "  {}",
            format!("ignored live keys: {}", plan.kv_denylisted.join(", ")).dimmed()
        );
    }
}
