use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use docdelta::apply::{ApplyOptions, ApplyReport, ChangeReport, RestoreReport, Updater};
use docdelta::backup::BackupRecord;
use docdelta::config::Settings;
use docdelta::error::DocdeltaError;
use docdelta::format::OutputFormat;
use docdelta::telemetry;

/// Incremental documentation updater
///
/// docdelta keeps one markdown document in step with the repository it
/// describes. It fingerprints tracked files, reports what changed since the
/// last update, and applies section-level edits (produced elsewhere) to the
/// document, with a backup, a changelog entry and a new baseline each time.
///
/// WORKFLOW:
///
///   1. docdelta diff          # report changes, write the update prompt
///   2. (send .docdelta/update_prompt.txt to your text service and save
///      its JSON answer as .docdelta/updates.json)
///   3. docdelta apply         # patch the document
///
/// Undo the last apply with: docdelta restore
#[derive(Parser)]
#[command(name = "docdelta")]
#[command(version, about, long_about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Repository root (default: current directory)
    #[arg(long, global = true, env = "DOCDELTA_ROOT", default_value = ".")]
    root: PathBuf,

    /// Config file (default: <root>/.docdelta/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show changed files and write the update prompt
    ///
    /// Compares the tracked files against the last saved state. Writes
    /// update_prompt.txt and update_request.json into the cache directory;
    /// never changes the saved state.
    Diff {
        /// Document to update (default: [document] target, README.md)
        #[arg(long)]
        target: Option<String>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Apply an update batch to the document
    ///
    /// Backs up the document, replaces the sections named in the batch,
    /// prepends a changelog entry and saves the new baseline.
    Apply {
        /// Document to update (default: [document] target, README.md)
        #[arg(long)]
        target: Option<String>,

        /// Update batch JSON (default: <cache_dir>/updates.json)
        #[arg(long)]
        updates: Option<PathBuf>,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Forget history and take the current files as the baseline
    Reset,

    /// List backups of the document, newest first
    Backups {
        /// Document whose backups to list
        #[arg(long)]
        target: Option<String>,

        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Put a backup back in place of the document
    ///
    /// The current text is backed up first, so a restore can itself be
    /// undone. State and changelog are left alone.
    Restore {
        /// Document to restore
        #[arg(long)]
        target: Option<String>,

        /// Backup key from `docdelta backups` (default: newest)
        #[arg(long)]
        backup: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.global.verbose);

    let settings = Settings::load(&cli.global.root, cli.global.config.as_deref())
        .map_err(DocdeltaError::from)?;
    let updater = Updater::new(settings);

    match cli.command {
        Commands::Diff { target, format } => diff(&updater, target.as_deref(), format),
        Commands::Apply {
            target,
            updates,
            dry_run,
            format,
        } => {
            let target = updater.settings().target_or_default(target.as_deref());
            let batch = updater.load_batch(updates.as_deref())?;
            let report = updater.apply(&batch, target, ApplyOptions { dry_run })?;
            print_apply(&report, format)
        }
        Commands::Reset => {
            let report = updater.reset()?;
            println!(
                "Baseline reset: {} tracked file(s) recorded in {}",
                report.tracked,
                report.state_path.display()
            );
            Ok(())
        }
        Commands::Backups { target, format } => {
            let target = updater.settings().target_or_default(target.as_deref());
            let backups = updater.list_backups(target)?;
            print_backups(target, &backups, format)
        }
        Commands::Restore { target, backup } => {
            let target = updater.settings().target_or_default(target.as_deref());
            let report = updater.restore(target, backup.as_deref())?;
            print_restore(&report);
            Ok(())
        }
    }
}

fn diff(updater: &Updater, target: Option<&str>, format: OutputFormat) -> Result<()> {
    let target = updater.settings().target_or_default(target);
    let report = updater.detect_changes()?;
    let files = updater
        .write_request(target, &report.changes)
        .context("could not write the update request")?;

    match format {
        OutputFormat::Json => {
            println!("{}", format.serialize(&report)?);
        }
        OutputFormat::Text => {
            print_changes(&report);
            if report.changes.is_empty() {
                println!("\nDocumentation is up to date.");
            } else {
                println!("\nNext:");
                println!("  1. Send {} to your text service", files.prompt_path.display());
                println!(
                    "  2. Save its JSON answer as {}",
                    updater.settings().updates_path().display()
                );
                println!("  3. docdelta apply --target {target}");
            }
        }
    }
    Ok(())
}

fn print_changes(report: &ChangeReport) {
    let changes = &report.changes;
    println!("Tracked files: {}", report.tracked);
    if let Some(reason) = &report.corrupt_state {
        println!("warning: saved state ignored ({reason}); every file counts as added");
    }

    println!("\nAdded ({}):", changes.added.len());
    for f in &changes.added {
        println!("  + {f}");
    }
    println!("\nModified ({}):", changes.modified.len());
    for f in &changes.modified {
        println!("  ~ {f}");
    }
    println!("\nRemoved ({}):", changes.removed.len());
    for f in &changes.removed {
        println!("  - {f}");
    }

    if !report.skipped.is_empty() {
        println!("\nUnreadable ({}):", report.skipped.len());
        for s in &report.skipped {
            println!("  ! {}: {}", s.path.display(), s.reason);
        }
    }
}

fn print_apply(report: &ApplyReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", format.serialize(report)?);
        return Ok(());
    }

    let verb = if report.dry_run { "Would update" } else { "Updated" };
    for s in &report.applied {
        println!("{verb} section: {}", s.section_name);
        println!("  reason: {}", s.reason);
    }
    for s in &report.missing {
        println!("Skipped section (not found): {}", s.section_name);
    }

    if report.dry_run {
        println!("\nDry run: nothing was written.");
        return Ok(());
    }
    if let Some(backup) = &report.backup {
        println!("\nBackup: {}", backup.display());
    }
    if report.document_changed {
        println!("{} updated ({} section(s))", report.target, report.applied.len());
    } else {
        println!("{} unchanged", report.target);
    }
    println!("Changelog and state saved.");
    Ok(())
}

fn print_backups(target: &str, backups: &[BackupRecord], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", format.serialize(&backups)?);
        return Ok(());
    }
    if backups.is_empty() {
        println!("No backups of {target}.");
        return Ok(());
    }
    for b in backups {
        println!("{}  {}", b.taken_at.format("%Y-%m-%d %H:%M:%S"), b.key);
    }
    Ok(())
}

fn print_restore(report: &RestoreReport) {
    println!(
        "Restored {} from {}",
        report.target, report.restored_from.key
    );
    match &report.safety_backup {
        Some(b) => println!("Previous text saved as {}", b.key),
        None => println!("Document already matched the backup."),
    }
}
