// Reporting and output for version-hunter
// Exports the aggregated result set as CSV or Markdown

use crate::aggregator::AggregatorSnapshot;
use chrono::Local;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Escape CSV field to prevent formula injection attacks
/// Cells starting with =, +, -, @, or tab are prefixed with single quote
fn escape_csv_field(field: &str) -> String {
    let needs_escaping = matches!(field.chars().next(), Some('=' | '+' | '-' | '@' | '\t'));

    if needs_escaping {
        // Prefix with single quote to prevent formula injection
        format!("\"'{}\"", field.replace('"', "\"\""))
    } else if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Pipes would break the Markdown table layout
fn escape_markdown_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
}

fn report_path(dir: &Path, extension: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("version_hunter_report_{}.{}", timestamp, extension))
}

pub fn export_csv(snapshot: &AggregatorSnapshot, dir: &Path) -> Result<PathBuf, std::io::Error> {
    let path = report_path(dir, "csv");
    let mut file = File::create(&path)?;

    writeln!(file, "Host,Type,Version,Method,Path,Status,Length")?;
    for host in &snapshot.hosts {
        for o in &host.outcomes {
            writeln!(
                file,
                "{},{},{},{},{},{},{}",
                escape_csv_field(&host.host),
                o.kind,
                escape_csv_field(&o.version),
                escape_csv_field(o.method.as_str()),
                escape_csv_field(&o.path),
                o.status_code,
                o.body_length
            )?;
        }
    }

    Ok(path)
}

pub fn export_markdown(snapshot: &AggregatorSnapshot, dir: &Path) -> Result<PathBuf, std::io::Error> {
    let path = report_path(dir, "md");
    let mut file = File::create(&path)?;

    writeln!(file, "# API Version Sweep Report\n")?;
    if snapshot.is_empty() {
        writeln!(file, "No versioned endpoints were probed.")?;
    }
    for host in &snapshot.hosts {
        writeln!(file, "## {}\n", host.host)?;
        writeln!(file, "| Type | Version | Method | Path | Status | Length |")?;
        writeln!(file, "|------|---------|--------|------|--------|--------|")?;
        for o in &host.outcomes {
            writeln!(
                file,
                "| {} | {} | {} | `{}` | {} | {} |",
                o.kind,
                o.version,
                o.method,
                escape_markdown_cell(&o.path),
                o.status_code,
                o.body_length
            )?;
        }
        writeln!(file)?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escaping() {
        assert_eq!(escape_csv_field("=cmd"), "\"'=cmd\"");
        assert_eq!(escape_csv_field("/a,b"), "\"/a,b\"");
        assert_eq!(escape_csv_field("/api/v1/users"), "/api/v1/users");
        assert_eq!(escape_csv_field(""), "");
    }
}
