//! Output formatting for exports and history.
//!
//! Exports render to Markdown, JSON, plain text or CSV. The table and
//! statistics views are for the terminal only.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{
    ConversationExport, ExportFormat, ExportHistoryEntry, ExportStatistics, Result, Role,
};

use super::history::format_bytes;

/// Width of the rule under the plain text header.
const TXT_RULE_WIDTH: usize = 60;

/// Renders an export in the given format.
///
/// # Errors
/// Returns error if JSON serialization fails.
pub fn render(export: &ConversationExport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(export)),
        ExportFormat::Json => render_json(export),
        ExportFormat::Txt => Ok(render_txt(export)),
        ExportFormat::Csv => Ok(render_csv(export)),
    }
}

/// Renders an export in a format given by name.
///
/// # Errors
/// `UnsupportedFormat` naming `format` if it is not a known format.
pub fn render_named(export: &ConversationExport, format: &str) -> Result<String> {
    render(export, format.parse()?)
}

fn role_heading(role: Role) -> &'static str {
    match role {
        Role::User => "👤 User",
        Role::Assistant => "🤖 Assistant",
        Role::Unknown => "❓ Unknown",
    }
}

/// Formats an export as Markdown.
#[must_use]
pub fn render_markdown(export: &ConversationExport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", export.title));
    out.push_str(&format!("**Site:** {}\n", export.site.display_name()));
    out.push_str(&format!(
        "**Exported:** {}\n",
        export.exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("**URL:** {}\n", export.url));
    out.push_str(&format!(
        "**Messages:** {} ({} user, {} assistant)\n\n",
        export.metadata.message_count,
        export.data.user_message_count(),
        export.data.assistant_message_count()
    ));

    out.push_str("---\n\n");

    for message in &export.data.messages {
        out.push_str(&format!("## {}\n\n", role_heading(message.role)));

        if let Some(dt) = message.timestamp {
            out.push_str(&format!("*{}*\n\n", dt.format("%Y-%m-%d %H:%M:%S UTC")));
        }

        out.push_str(&message.content);
        out.push_str("\n\n---\n\n");
    }

    out.push_str("## Export Metadata\n\n");
    out.push_str(&format!("- **Export ID:** {}\n", export.id));
    out.push_str(&format!("- **Export Version:** {}\n", export.metadata.export_version));
    out.push_str(&format!("- **User Agent:** {}\n", export.metadata.user_agent));
    out.push_str(&format!(
        "- **Extraction Time:** {} ms\n",
        export.metadata.extraction_time
    ));
    out.push_str(&format!(
        "- **Data Integrity:** {}\n",
        if export.metadata.data_integrity { "✓" } else { "✗" }
    ));

    if !export.metadata.parsing_errors.is_empty() {
        out.push_str("- **Warnings:**\n");
        for warning in &export.metadata.parsing_errors {
            out.push_str(&format!("  - {warning}\n"));
        }
    }

    out
}

/// Formats an export as pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn render_json(export: &ConversationExport) -> Result<String> {
    serde_json::to_string_pretty(export).map_err(crate::domain::AppError::json_parse)
}

/// Formats an export as plain text.
#[must_use]
pub fn render_txt(export: &ConversationExport) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", export.title));
    out.push_str(&format!("Site: {}\n", export.site.display_name()));
    out.push_str(&format!("URL: {}\n", export.url));
    out.push_str(&format!(
        "Exported: {}\n",
        export.exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Messages: {}\n", export.metadata.message_count));
    out.push_str(&"=".repeat(TXT_RULE_WIDTH));
    out.push_str("\n\n");

    for message in &export.data.messages {
        out.push_str(&format!(
            "[{}]\n{}\n\n",
            message.role.to_string().to_uppercase(),
            message.content
        ));
    }

    out
}

/// Formats an export as CSV, one row per message.
#[must_use]
pub fn render_csv(export: &ConversationExport) -> String {
    let mut rows = vec!["Index,Role,Timestamp,Content,MessageId".to_string()];

    for (i, message) in export.data.messages.iter().enumerate() {
        let timestamp = message
            .timestamp
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default();
        let message_id = message
            .metadata
            .as_ref()
            .and_then(|m| m.message_id.as_deref())
            .unwrap_or_default();

        rows.push(
            [
                (i + 1).to_string().as_str(),
                message.role.to_string().as_str(),
                timestamp.as_str(),
                message.content.as_str(),
                message_id,
            ]
            .iter()
            .map(|field| csv_field(field))
            .collect::<Vec<_>>()
            .join(","),
        );
    }

    rows.join("\n")
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Formats history entries as a table.
#[must_use]
pub fn format_history_table(entries: &[ExportHistoryEntry]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Exported", "Site", "Format", "Msgs", "Size", "Title"]);

    for entry in entries {
        let short_id: String = entry.export_id.chars().take(8).collect();
        table.add_row(vec![
            short_id,
            entry.exported_at.format("%Y-%m-%d %H:%M").to_string(),
            entry.site.display_name().to_string(),
            entry.format.as_str().to_string(),
            entry.message_count.to_string(),
            format_bytes(entry.file_size),
            truncate(&entry.title, 35),
        ]);
    }

    table.to_string()
}

/// Formats history statistics for display.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_statistics(stats: &ExportStatistics, bytes_in_use: u64) -> String {
    let mut out = format!(
        "{}\n  Exports: {}\n  Messages: {}\n  Total size: {}\n  Average size: {}\n  Average messages: {:.1}\n  Storage in use: {}",
        "📊 Export Statistics".bold(),
        stats.total_exports.to_string().cyan(),
        stats.total_messages.to_string().cyan(),
        format_bytes(stats.total_file_size).yellow(),
        format_bytes(stats.average_file_size.round() as u64).yellow(),
        stats.average_message_count,
        format_bytes(bytes_in_use).yellow()
    );

    for (site, count) in &stats.by_site {
        out.push_str(&format!("\n  {}: {}", site.display_name(), count.to_string().green()));
    }
    for (format, count) in &stats.by_format {
        out.push_str(&format!("\n  {}: {}", format.as_str(), count.to_string().blue()));
    }

    if let (Some(oldest), Some(newest)) = (stats.oldest_export, stats.newest_export) {
        out.push_str(&format!(
            "\n  Range: {} → {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        ));
    }

    out
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
