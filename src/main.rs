//! Chat Archiver - Export AI chat conversations from page snapshots.
//!
//! Reads a saved ChatGPT, Claude or Gemini page, validates the conversation
//! and writes it as Markdown, JSON, plain text or CSV. Every export is
//! recorded in a local history that can be listed, re-rendered and pruned.
//!
//!   chat-archive export --page page.json            # Export with config defaults
//!   chat-archive export -p page.json -f csv --stdout
//!   chat-archive history                            # List past exports
//!   chat-archive show <id> -f txt                   # Render a past export again
//!   chat-archive cleanup --days 7                   # Prune old exports

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chat_archiver::application::{
    format_history_table, format_statistics, render, ConversationExtractor, ExportOptions,
    Exporter, HistoryManager,
};
use chat_archiver::cli::{Cli, Commands};
use chat_archiver::domain::{AppConfig, ExportFormat, Site};
use chat_archiver::infrastructure::{
    ensure_config_exists, load_config, save_config, DocumentAccessor, SnapshotDocument, SqliteStore,
    HISTORY_NAMESPACE,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config()?;

    match cli.command {
        Commands::Export {
            page,
            site,
            format,
            output,
            stdout,
            url,
            no_metadata,
            no_timestamps,
            skip_validation,
            no_save,
            force_duplicate,
        } => {
            let mut options = ExportOptions::from_config(&config.export);
            if let Some(format) = format {
                options.format = format.parse()?;
            }
            options.include_metadata &= !no_metadata;
            options.include_timestamps &= !no_timestamps;
            options.validate_data &= !skip_validation;
            options.save_to_storage &= !no_save;
            options.force_duplicate = force_duplicate;
            options.url = url;

            let target = if stdout {
                None
            } else {
                Some(output)
            };
            cmd_export(&config, &page, site.as_deref(), &options, target).await?;
        }
        Commands::History { limit } => {
            cmd_history(&config, limit).await?;
        }
        Commands::Stats => {
            cmd_stats(&config).await?;
        }
        Commands::Show { id, format, output } => {
            cmd_show(&config, &id, format.as_deref(), output.as_deref()).await?;
        }
        Commands::Remove { id } => {
            cmd_remove(&config, &id).await?;
        }
        Commands::Cleanup { days } => {
            cmd_cleanup(&config, days.unwrap_or(config.history.retention_days)).await?;
        }
        Commands::Verify => {
            cmd_verify(&config).await?;
        }
        Commands::Config { reset } => {
            cmd_config(reset)?;
        }
    }

    Ok(())
}

/// Opens the history database named in the config.
fn open_history(config: &AppConfig) -> anyhow::Result<HistoryManager<SqliteStore>> {
    let path = config.history_db_path();
    let store = SqliteStore::open(&path, HISTORY_NAMESPACE, Some(config.history.quota_bytes))
        .with_context(|| format!("Failed to open history at {}", path.display()))?;
    Ok(HistoryManager::new(store).with_max_entries(config.history.max_entries))
}

/// Resolves a full export id from a unique prefix.
async fn resolve_id(history: &HistoryManager<SqliteStore>, id: &str) -> anyhow::Result<String> {
    let matches: Vec<String> = history
        .get_history(None)
        .await?
        .into_iter()
        .map(|e| e.export_id)
        .filter(|export_id| export_id.starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => Ok(id.to_string()),
        [only] => Ok(only.clone()),
        _ => bail!("Export id '{id}' is ambiguous ({} matches)", matches.len()),
    }
}

/// Writes rendered output to `path` or stdout.
fn write_output(content: &str, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{content}"),
    }
    Ok(())
}

/// Export command.
///
/// `target` is `None` for stdout, `Some(None)` for an auto-generated file name.
async fn cmd_export(
    config: &AppConfig,
    page: &Path,
    site: Option<&str>,
    options: &ExportOptions,
    target: Option<Option<PathBuf>>,
) -> anyhow::Result<()> {
    let document = SnapshotDocument::load(page)
        .with_context(|| format!("Failed to load page snapshot {}", page.display()))?;

    let site = match site {
        Some(name) => name.parse::<Site>().map_err(|e| anyhow!(e))?,
        None => {
            let url = document.url().await?;
            Site::from_url(&url)
                .ok_or_else(|| anyhow!("Cannot detect chat provider from {url}; pass --site"))?
        }
    };

    let extractor = ConversationExtractor::new(document, site)?;
    let history = open_history(config)?;
    let export = Exporter::new(&extractor, &history)?
        .export_conversation(options)
        .await?;

    let content = render(&export, options.format)?;

    match target {
        None => write_output(&content, None)?,
        Some(output) => {
            let path = output.unwrap_or_else(|| PathBuf::from(export.filename(options.format)));
            write_output(&content, Some(&path))?;
            println!(
                "{} Exported {} messages from {} to {}",
                "✓".green().bold(),
                export.metadata.message_count,
                export.site.display_name().cyan(),
                path.display()
            );
        }
    }

    for warning in &export.metadata.parsing_errors {
        eprintln!("{} {}", "⚠".yellow(), warning);
    }

    Ok(())
}

/// History listing command.
async fn cmd_history(config: &AppConfig, limit: usize) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let entries = history.get_history(Some(limit)).await?;

    if entries.is_empty() {
        println!("No exports recorded yet.");
        return Ok(());
    }

    println!("{}", format_history_table(&entries));
    Ok(())
}

/// Show statistics command.
async fn cmd_stats(config: &AppConfig) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let stats = history.get_statistics().await?;
    let usage = history.storage_usage().await?;

    println!("{}", format_statistics(&stats, usage));
    Ok(())
}

/// Render a stored export again.
async fn cmd_show(
    config: &AppConfig,
    id: &str,
    format: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let id = resolve_id(&history, id).await?;
    let export = match history.get_export_for_redownload(&id).await {
        Ok(export) => export,
        Err(e) if e.is_not_found() => {
            bail!("{e} (see `chat-archive history` and `chat-archive verify`)")
        }
        Err(e) => return Err(e.into()),
    };

    let format = match format {
        Some(name) => name.parse::<ExportFormat>()?,
        None => export.format,
    };

    write_output(&render(&export, format)?, output)
}

/// Remove command.
async fn cmd_remove(config: &AppConfig, id: &str) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let id = resolve_id(&history, id).await?;

    if history.remove_from_history(&id).await? {
        println!("{} Removed export {}", "✓".green().bold(), id);
    } else {
        println!("No export with id {id}");
    }
    Ok(())
}

/// Cleanup command.
async fn cmd_cleanup(config: &AppConfig, days: u32) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let result = history.cleanup_old_history(days).await?;

    if result.removed_count == 0 {
        println!("No exports older than {days} days.");
    } else {
        println!(
            "{} Deleted {} export(s), freed {}",
            "✓".green().bold(),
            result.removed_count,
            result.freed_human()
        );
    }
    Ok(())
}

/// Integrity check command.
async fn cmd_verify(config: &AppConfig) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let report = history.verify_integrity().await?;

    if report.is_consistent() {
        println!("{} {} entries checked, all payloads present", "✓".green().bold(), report.checked);
        return Ok(());
    }

    println!(
        "{} {} of {} entries have no payload:",
        "✗".red().bold(),
        report.dangling_payloads.len(),
        report.checked
    );
    for id in &report.dangling_payloads {
        println!("  {id}");
    }
    println!("Remove them with: chat-archive remove <id>");
    Ok(())
}

/// Config location command.
fn cmd_config(reset: bool) -> anyhow::Result<()> {
    if reset {
        save_config(&AppConfig::default())?;
    }
    let path = ensure_config_exists()?;
    println!("{}", "⚙ Configuration".bold());
    println!("  {}", path.display());
    Ok(())
}

/// Setup logging with the given verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
