//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat Archiver - Export AI chat conversations and manage the export history.
#[derive(Parser, Debug)]
#[command(name = "chat-archive")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a conversation from a page snapshot.
    Export {
        /// Page snapshot (JSON) to read the conversation from.
        #[arg(short, long)]
        page: PathBuf,

        /// Chat provider: chatgpt, claude or gemini (detected from the URL if omitted).
        #[arg(short, long)]
        site: Option<String>,

        /// Output format: markdown, json, txt or csv (config default if omitted).
        #[arg(short, long)]
        format: Option<String>,

        /// Output file path (auto-generated name if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print to stdout instead of writing a file.
        #[arg(long, conflicts_with = "output")]
        stdout: bool,

        /// URL to record instead of the page URL.
        #[arg(long)]
        url: Option<String>,

        /// Leave per-message metadata out.
        #[arg(long)]
        no_metadata: bool,

        /// Leave per-message timestamps out.
        #[arg(long)]
        no_timestamps: bool,

        /// Export even if fatal validation rules fail.
        #[arg(long)]
        skip_validation: bool,

        /// Do not record the export in the history.
        #[arg(long)]
        no_save: bool,

        /// Do not warn if the conversation was exported before.
        #[arg(long)]
        force_duplicate: bool,
    },

    /// List past exports (most recent first).
    History {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show statistics about the export history.
    Stats,

    /// Render a past export again.
    Show {
        /// Export ID (full or unique prefix).
        id: String,

        /// Output format (the export's own format if omitted).
        #[arg(short, long)]
        format: Option<String>,

        /// Output file path (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove an export from the history.
    Remove {
        /// Export ID (full or unique prefix).
        id: String,
    },

    /// Delete exports older than the retention period.
    Cleanup {
        /// Retention period in days (config value if omitted).
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Check that every history entry still has its payload.
    Verify,

    /// Show config file location, creating a default one if missing.
    Config {
        /// Overwrite the config file with default values.
        #[arg(long)]
        reset: bool,
    },
}
