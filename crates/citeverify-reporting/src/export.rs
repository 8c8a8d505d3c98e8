use std::io::Write;
use std::path::Path;

use serde::Serialize;

use citeverify_core::{CheckStats, CheckedReference, VerificationStatus};

use crate::ExportFormat;

/// One line of the per-reference report table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// 1-based position in the bibliography.
    pub index: usize,
    pub first_author: String,
    pub year: i32,
    pub title: String,
    #[serde(rename = "type")]
    pub type_label: String,
    pub doi: Option<String>,
    /// The cited URL, or a doi.org link when only a DOI is known.
    pub url: Option<String>,
    pub raw_text: String,
    pub status: String,
    pub explanation: String,
}

/// Build report rows in bibliography order.
pub fn report_rows(results: &[CheckedReference]) -> Vec<ReportRow> {
    results
        .iter()
        .map(|checked| {
            let r = &checked.reference;
            ReportRow {
                index: checked.index + 1,
                first_author: r.first_author_surname.clone(),
                year: r.year,
                title: r.title.clone(),
                type_label: r.ref_type.label().to_string(),
                doi: r.doi().map(String::from),
                url: r.link(),
                raw_text: r.raw_normalized_text.clone(),
                status: checked.result.status.as_str().to_string(),
                explanation: checked.result.explanation.clone(),
            }
        })
        .collect()
}

/// Export one document's results to `path`.
pub fn export_results(
    filename: &str,
    results: &[CheckedReference],
    format: ExportFormat,
    path: &Path,
) -> Result<(), String> {
    let rows = report_rows(results);
    let content = match format {
        ExportFormat::Csv => export_csv(&rows),
        ExportFormat::Json => export_json(filename, results, &rows)?,
        ExportFormat::Markdown => export_markdown(filename, results, &rows),
    };

    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    Ok(())
}

pub(crate) fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn export_csv(rows: &[ReportRow]) -> String {
    let mut out =
        String::from("Index,First Author,Year,Title,Type,DOI,URL,Raw Text,Status,Explanation\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            row.index,
            csv_escape(&row.first_author),
            row.year,
            csv_escape(&row.title),
            csv_escape(&row.type_label),
            csv_escape(row.doi.as_deref().unwrap_or("")),
            csv_escape(row.url.as_deref().unwrap_or("")),
            csv_escape(&row.raw_text),
            row.status,
            csv_escape(&row.explanation),
        ));
    }
    out
}

#[derive(Serialize)]
struct JsonStats {
    total: usize,
    validated: usize,
    invalid: usize,
    not_found: usize,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    filename: &'a str,
    stats: JsonStats,
    references: &'a [ReportRow],
}

pub fn export_json(
    filename: &str,
    results: &[CheckedReference],
    rows: &[ReportRow],
) -> Result<String, String> {
    let stats = CheckStats::from_results(results);
    let report = JsonReport {
        filename,
        stats: JsonStats {
            total: stats.total,
            validated: stats.validated,
            invalid: stats.invalid,
            not_found: stats.not_found,
        },
        references: rows,
    };
    serde_json::to_string_pretty(&report)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| format!("Failed to serialize report: {}", e))
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn status_badge(status: &str) -> &'static str {
    match status {
        s if s == VerificationStatus::Validated.as_str() => "✅ validated",
        s if s == VerificationStatus::Invalid.as_str() => "❌ invalid",
        _ => "⚠️ not found",
    }
}

pub fn export_markdown(filename: &str, results: &[CheckedReference], rows: &[ReportRow]) -> String {
    let stats = CheckStats::from_results(results);
    let mut out = format!("# Citation check: {}\n\n", md_escape(filename));
    out.push_str(&format!(
        "**{}** references: **{}** validated, **{}** invalid, **{}** not found.\n\n",
        stats.total, stats.validated, stats.invalid, stats.not_found
    ));

    if rows.is_empty() {
        out.push_str("_No references were checked._\n");
        return out;
    }

    out.push_str("| # | Author | Year | Title | Type | Link | Status | Explanation |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for row in rows {
        let link = row
            .url
            .as_deref()
            .map(|u| format!("[link]({})", u))
            .unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            row.index,
            md_escape(&row.first_author),
            row.year,
            md_escape(&row.title),
            row.type_label,
            link,
            status_badge(&row.status),
            md_escape(&row.explanation),
        ));
    }

    if !stats.warnings.is_empty() {
        out.push_str("\n## Needs attention\n\n");
        for warning in &stats.warnings {
            out.push_str(&format!("- {}\n", md_escape(warning)));
        }
    }
    out
}
