//! Output formatting for CLI operations.

use arcx::{Archive, ExtractReport, FormatChain};
use serde_json::json;

use crate::file_selector::tree_path;

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the chains a file can be opened through
    fn format_chains(&self, chains: &[FormatChain]) -> String;

    /// Formats the tree of an opened archive
    fn format_list(&self, archive: &Archive) -> String;

    /// Formats the outcome of an extraction job
    fn format_report(&self, report: &ExtractReport) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_chains(&self, chains: &[FormatChain]) -> String {
        let mut output = String::new();
        for (i, chain) in chains.iter().enumerate() {
            output.push_str(&format!("{:>3}  {}\n", i, chain));
        }
        output
    }

    fn format_list(&self, archive: &Archive) -> String {
        let mut output = String::new();
        output.push_str(&format!("Archive: {} ({})\n", archive.path().display(), archive.chain()));
        output.push_str(&format!("{:>12} {:>19} {}\n", "Size", "Modified", "Name"));
        output.push_str(&"-".repeat(70));
        output.push('\n');

        let tree = archive.tree();
        let mut total_size: u64 = 0;
        let mut file_count = 0;
        let mut dir_count = 0;

        for (index, entry) in tree.iter() {
            if tree.is_root_alias(index) {
                continue;
            }
            if entry.is_dir {
                dir_count += 1;
            } else {
                file_count += 1;
                total_size += entry.size;
            }

            let size_str = if entry.is_dir {
                String::new()
            } else {
                humanize_bytes(entry.size)
            };

            let mtime_str = entry
                .modification_time
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());

            let type_indicator = if entry.is_dir { "/" } else { "" };
            let lock = if entry.encrypted { " *" } else { "" };

            output.push_str(&format!(
                "{:>12} {:>19} {}{}{}\n",
                size_str,
                mtime_str,
                tree_path(tree, index),
                type_indicator,
                lock
            ));
        }

        // Footer
        output.push_str(&"-".repeat(70));
        output.push('\n');
        output.push_str(&format!(
            "{} files, {} directories, {} total\n",
            file_count,
            dir_count,
            humanize_bytes(total_size)
        ));

        output
    }

    fn format_report(&self, report: &ExtractReport) -> String {
        let mut output = String::new();

        if report.is_cancelled() {
            output.push_str("Extraction cancelled\n");
        } else if let Some(failure) = &report.failure {
            output.push_str(&format!("Extraction failed: {}\n", failure));
        }
        output.push_str(&format!(
            "Extracted {} files ({})\n",
            report.files_extracted,
            humanize_bytes(report.bytes_written)
        ));
        if report.files_skipped > 0 {
            output.push_str(&format!("Skipped {} existing files\n", report.files_skipped));
        }
        if !report.errors.is_empty() {
            output.push('\n');
            output.push_str(&error_summary(report));
        }

        output
    }
}

/// The ignored-error log, printed even with `--quiet`. Empty for a clean job.
pub fn error_summary(report: &ExtractReport) -> String {
    let mut output = String::new();
    if report.errors.is_empty() {
        return output;
    }
    output.push_str(&format!("{} errors were ignored:\n", report.errors.len()));
    for entry in &report.errors {
        output.push_str(&format!("  {}\n", entry));
    }
    output
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_chains(&self, chains: &[FormatChain]) -> String {
        let items: Vec<_> = chains
            .iter()
            .enumerate()
            .map(|(i, chain)| {
                json!({
                    "index": i,
                    "chain": chain.to_string(),
                    "formats": chain.formats().iter().map(|f| f.name()).collect::<Vec<_>>(),
                })
            })
            .collect();

        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_list(&self, archive: &Archive) -> String {
        let tree = archive.tree();
        let entries: Vec<_> = tree
            .iter()
            .filter(|&(index, _)| !tree.is_root_alias(index))
            .map(|(index, e)| {
                json!({
                    "index": index,
                    "path": tree_path(tree, index),
                    "size": e.size,
                    "modified": e.modification_time.map(|t| t.as_unix_secs()),
                    "attributes": e.attributes.map(|a| a.bits()),
                    "is_directory": e.is_dir,
                    "encrypted": e.encrypted,
                })
            })
            .collect();
        let obj = json!({
            "archive": archive.path().display().to_string(),
            "chain": archive.chain().to_string(),
            "entries": entries,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_report(&self, report: &ExtractReport) -> String {
        let obj = json!({
            "success": report.is_clean(),
            "state": format!("{:?}", report.state),
            "cancelled": report.is_cancelled(),
            "failure": report.failure.as_ref().map(|e| e.to_string()),
            "files_extracted": report.files_extracted,
            "files_skipped": report.files_skipped,
            "bytes_written": report.bytes_written,
            "errors": report
                .errors
                .iter()
                .map(|e| json!({"path": e.path.display().to_string(), "error": e.detail}))
                .collect::<Vec<_>>(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Creates the appropriate formatter
pub fn create_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
