//! Chat Archiver - Export AI chat conversations and keep a history of exports.
//!
//! Reads a conversation rendered on ChatGPT, Claude or Gemini through a
//! [`infrastructure::DocumentAccessor`], validates and normalizes it, and
//! renders it as Markdown, JSON, plain text or CSV. Exports can be recorded
//! in a history backed by any [`infrastructure::KeyValueStore`].
//!
//! # Example
//!
//! ```no_run
//! use chat_archiver::application::{render, ConversationExtractor, ExportOptions, Exporter, HistoryManager};
//! use chat_archiver::domain::{ExportFormat, Site};
//! use chat_archiver::infrastructure::{MemoryStore, SnapshotDocument};
//! use std::path::Path;
//!
//! # async fn run() -> chat_archiver::domain::Result<()> {
//! let page = SnapshotDocument::load(Path::new("page.json"))?;
//! let extractor = ConversationExtractor::new(page, Site::Claude)?;
//! let history = HistoryManager::new(MemoryStore::new());
//! let export = Exporter::new(&extractor, &history)?
//!     .export_conversation(&ExportOptions::default())
//!     .await?;
//! println!("{}", render(&export, ExportFormat::Markdown)?);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
