use std::io::Write;

use citeverify_core::{
    CheckStats, CheckedReference, ProgressEvent, Reference, SkipStats, VerificationStatus,
};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the extraction summary after the model has structured the bibliography.
pub fn print_extraction_summary(
    w: &mut dyn Write,
    pdf_name: &str,
    total_refs: usize,
    skip_stats: &SkipStats,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Extracting references from {}...", pdf_name)?;
    writeln!(w, "Found {} references to check", total_refs)?;

    if skip_stats.total() > 0 {
        let msg = format!(
            "(Skipped {} implausible years, {} unknown types, {} empty titles)",
            skip_stats.implausible_year, skip_stats.unknown_type, skip_stats.empty_title
        );
        if color.enabled() {
            writeln!(w, "{}", msg.dimmed())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

fn status_label(status: VerificationStatus, color: ColorMode) -> String {
    match (status, color.enabled()) {
        (VerificationStatus::Validated, true) => "VALIDATED".green().to_string(),
        (VerificationStatus::Invalid, true) => "INVALID".red().bold().to_string(),
        (VerificationStatus::NotFound, true) => "NOT FOUND".yellow().to_string(),
        (VerificationStatus::Validated, false) => "VALIDATED".to_string(),
        (VerificationStatus::Invalid, false) => "INVALID".to_string(),
        (VerificationStatus::NotFound, false) => "NOT FOUND".to_string(),
    }
}

/// One line describing a progress event, or `None` for events the progress
/// bar shows on its own.
pub fn format_progress(event: &ProgressEvent, color: ColorMode) -> Option<String> {
    match event {
        ProgressEvent::Checking { .. } => None,
        ProgressEvent::Result {
            index,
            total,
            title,
            result,
        } => Some(format!(
            "[{}/{}] {} -> {}",
            index + 1,
            total,
            truncate(title, 50),
            status_label(result.status, color)
        )),
        ProgressEvent::Cancelled { skipped } => {
            let msg = format!("Cancelled: {} references were not checked", skipped);
            Some(if color.enabled() {
                msg.yellow().to_string()
            } else {
                msg
            })
        }
    }
}

/// Print references extracted in a dry run.
pub fn print_dry_run(
    w: &mut dyn Write,
    pdf_name: &str,
    refs: &[Reference],
    skip_stats: &SkipStats,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} ({} references extracted)\n",
            "DRY RUN:".bold().cyan(),
            pdf_name.bold(),
            refs.len()
        )?;
    } else {
        writeln!(
            w,
            "DRY RUN: {} ({} references extracted)\n",
            pdf_name,
            refs.len()
        )?;
    }

    for (i, reference) in refs.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{}", format!("[{}]", i + 1).bold().yellow())?;
        } else {
            writeln!(w, "[{}]", i + 1)?;
        }
        writeln!(w, "  Title:   {}", reference.title)?;
        writeln!(w, "  Author:  {}", reference.first_author_surname)?;
        writeln!(w, "  Year:    {}", reference.year)?;
        writeln!(w, "  Type:    {}", reference.ref_type.label())?;
        if let Some(doi) = reference.doi() {
            writeln!(w, "  DOI:     {}", doi)?;
        }
        if let Some(url) = reference.url() {
            writeln!(w, "  URL:     {}", url)?;
        }
        let raw = truncate(&reference.raw_normalized_text, 200);
        if color.enabled() {
            writeln!(w, "  Raw:     {}", raw.dimmed())?;
        } else {
            writeln!(w, "  Raw:     {}", raw)?;
        }
        writeln!(w)?;
    }

    writeln!(
        w,
        "Total: {} references ({} skipped during extraction)",
        refs.len(),
        skip_stats.total()
    )?;
    Ok(())
}

/// Print a block for every reference that was not validated.
pub fn print_warning_report(
    w: &mut dyn Write,
    results: &[CheckedReference],
    color: ColorMode,
) -> std::io::Result<()> {
    for checked in results
        .iter()
        .filter(|c| c.result.status != VerificationStatus::Validated)
    {
        print_warning_block(w, checked, color)?;
    }
    Ok(())
}

fn print_warning_block(
    w: &mut dyn Write,
    checked: &CheckedReference,
    color: ColorMode,
) -> std::io::Result<()> {
    let reference = &checked.reference;
    let heading = match checked.result.status {
        VerificationStatus::Invalid => "INVALID REFERENCE",
        _ => "REFERENCE NOT FOUND",
    };

    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold().red())?;
        writeln!(w, "{}", format!("[{}] {}", checked.index + 1, heading).bold().red())?;
        writeln!(w, "{}", sep.bold().red())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "[{}] {}", checked.index + 1, heading)?;
        writeln!(w, "{}", sep)?;
    }
    writeln!(w)?;

    if color.enabled() {
        writeln!(w, "{}:", "Reference".bold())?;
        writeln!(w, "  {}", reference.raw_normalized_text.cyan())?;
    } else {
        writeln!(w, "Reference:")?;
        writeln!(w, "  {}", reference.raw_normalized_text)?;
    }
    if let Some(link) = reference.link() {
        writeln!(w, "Link: {}", link)?;
    }
    writeln!(w)?;

    if color.enabled() {
        writeln!(w, "{} {}", "Explanation:".bold(), checked.result.explanation)?;
    } else {
        writeln!(w, "Explanation: {}", checked.result.explanation)?;
    }
    Ok(())
}

/// Print the final summary.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &CheckStats,
    skip_stats: &SkipStats,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  References checked: {}", stats.total)?;
    if skip_stats.total() > 0 {
        let msg = format!("Skipped during extraction: {}", skip_stats.total());
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {}", msg)?;
        }
    }
    writeln!(w)?;

    if color.enabled() {
        writeln!(w, "  {} {}", "Validated:".green(), stats.validated)?;
    } else {
        writeln!(w, "  Validated: {}", stats.validated)?;
    }
    if stats.invalid > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Invalid:".red(), stats.invalid)?;
        } else {
            writeln!(w, "  Invalid: {}", stats.invalid)?;
        }
    }
    if stats.not_found > 0 {
        if color.enabled() {
            writeln!(w, "  {} {}", "Not found:".yellow(), stats.not_found)?;
        } else {
            writeln!(w, "  Not found: {}", stats.not_found)?;
        }
    }

    writeln!(w)?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeverify_core::{ReferenceType, VerificationResult};

    const PLAIN: ColorMode = ColorMode(false);

    fn checked(index: usize, result: VerificationResult) -> CheckedReference {
        CheckedReference {
            index,
            reference: Reference {
                title: "Attention Is All You Need".into(),
                first_author_surname: "Vaswani".into(),
                doi: Some("10.5555/3295222.3295349".into()),
                url: None,
                year: 2017,
                ref_type: ReferenceType::ConferencePaper,
                raw_normalized_text: "Vaswani, A. (2017). Attention Is All You Need.".into(),
            },
            result,
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn progress_lines() {
        let result = ProgressEvent::Result {
            index: 1,
            total: 3,
            title: "Attention Is All You Need".into(),
            result: VerificationResult::not_found("none"),
        };
        assert_eq!(
            format_progress(&result, PLAIN).as_deref(),
            Some("[2/3] Attention Is All You Need -> NOT FOUND")
        );

        let checking = ProgressEvent::Checking {
            index: 0,
            total: 3,
            title: "x".into(),
        };
        assert!(format_progress(&checking, PLAIN).is_none());

        let cancelled = ProgressEvent::Cancelled { skipped: 2 };
        assert_eq!(
            format_progress(&cancelled, PLAIN).as_deref(),
            Some("Cancelled: 2 references were not checked")
        );
    }

    #[test]
    fn warning_report_skips_validated() {
        let results = vec![
            checked(0, VerificationResult::validated("ok")),
            checked(1, VerificationResult::invalid("DOI does not match Crossref record.")),
        ];
        let out = render(|w| print_warning_report(w, &results, PLAIN));
        assert!(!out.contains("[1]"));
        assert!(out.contains("[2] INVALID REFERENCE"));
        assert!(out.contains("Link: https://doi.org/10.5555/3295222.3295349"));
        assert!(out.contains("Explanation: DOI does not match Crossref record."));
    }

    #[test]
    fn summary_hides_zero_counts() {
        let stats = CheckStats {
            total: 2,
            validated: 2,
            ..Default::default()
        };
        let out = render(|w| print_summary(w, &stats, &SkipStats::default(), PLAIN));
        assert!(out.contains("References checked: 2"));
        assert!(out.contains("Validated: 2"));
        assert!(!out.contains("Invalid"));
        assert!(!out.contains("Skipped"));
    }

    #[test]
    fn dry_run_lists_fields() {
        let refs = vec![checked(0, VerificationResult::validated("")).reference];
        let out = render(|w| print_dry_run(w, "paper.pdf", &refs, &SkipStats::default(), PLAIN));
        assert!(out.starts_with("DRY RUN: paper.pdf (1 references extracted)"));
        assert!(out.contains("  Type:    Conference Paper"));
        assert!(out.contains("  DOI:     10.5555/3295222.3295349"));
        assert!(out.contains("Total: 1 references (0 skipped during extraction)"));
    }
}
