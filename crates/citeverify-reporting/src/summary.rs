use std::path::Path;

use citeverify_core::{CheckStats, CheckedReference};

use crate::export::csv_escape;

/// One file's line in a folder summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub file: String,
    pub found_references: usize,
    pub verified: usize,
    pub warnings: usize,
    /// Raw text of every reference that was not validated.
    pub warning_list: Vec<String>,
    /// Per-reference audit blocks (reference, status, explanation).
    pub explanations: Vec<String>,
}

impl SummaryRow {
    pub fn from_results(file: impl Into<String>, results: &[CheckedReference]) -> Self {
        let stats = CheckStats::from_results(results);
        let explanations = results
            .iter()
            .map(|checked| {
                format!(
                    "Reference: {}\nStatus: {}\nExplanation: {}\n",
                    checked.reference.raw_normalized_text,
                    checked.result.status.as_str(),
                    checked.result.explanation
                )
            })
            .collect();
        Self {
            file: file.into(),
            found_references: stats.total,
            verified: stats.validated,
            warnings: stats.warning_count(),
            warning_list: stats.warnings,
            explanations,
        }
    }

    /// A row for a file that could not be processed at all.
    pub fn failed(file: impl Into<String>, error: &str) -> Self {
        Self {
            file: file.into(),
            found_references: 0,
            verified: 0,
            warnings: 0,
            warning_list: vec![],
            explanations: vec![format!("Error: {}", error)],
        }
    }
}

pub fn summary_csv(rows: &[SummaryRow]) -> String {
    let mut out = String::from("File,Found References,Verified,Warnings,Warning List,Explanation\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_escape(&row.file),
            row.found_references,
            row.verified,
            row.warnings,
            csv_escape(&row.warning_list.join("\n")),
            csv_escape(&row.explanations.join("\n")),
        ));
    }
    out
}

/// Rewrite the whole summary file with the rows processed so far.
pub fn write_summary_csv(rows: &[SummaryRow], path: &Path) -> Result<(), String> {
    std::fs::write(path, summary_csv(rows)).map_err(|e| format!("Failed to write summary: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeverify_core::{Reference, ReferenceType, VerificationResult};

    fn checked(index: usize, raw: &str, result: VerificationResult) -> CheckedReference {
        CheckedReference {
            index,
            reference: Reference {
                title: "T".into(),
                first_author_surname: "Doe".into(),
                doi: None,
                url: None,
                year: 2020,
                ref_type: ReferenceType::Book,
                raw_normalized_text: raw.into(),
            },
            result,
        }
    }

    #[test]
    fn row_counts_and_lists() {
        let results = vec![
            checked(0, "Doe (2020). T.", VerificationResult::validated("ok")),
            checked(1, "Roe (2019). U.", VerificationResult::invalid("DOI does not match Crossref record.")),
            checked(2, "Poe (2018). V.", VerificationResult::not_found("none")),
        ];
        let row = SummaryRow::from_results("a.pdf", &results);
        assert_eq!(row.found_references, 3);
        assert_eq!(row.verified, 1);
        assert_eq!(row.warnings, 2);
        assert_eq!(row.warning_list, vec!["Roe (2019). U.", "Poe (2018). V."]);
        assert_eq!(
            row.explanations[1],
            "Reference: Roe (2019). U.\nStatus: invalid\nExplanation: DOI does not match Crossref record.\n"
        );
    }

    #[test]
    fn csv_quotes_multiline_cells() {
        let row = SummaryRow::from_results(
            "b.pdf",
            &[checked(0, "Poe, E. (2018). V.", VerificationResult::not_found("none"))],
        );
        let csv = summary_csv(&[row]);
        assert!(csv.starts_with("File,Found References,Verified,Warnings,Warning List,Explanation\n"));
        assert!(csv.contains("b.pdf,1,0,1,\"Poe, E. (2018). V.\",\"Reference: Poe, E. (2018). V.\nStatus: not_found"));
    }

    #[test]
    fn rewrite_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let first = SummaryRow::failed("a.pdf", "no bibliography");
        write_summary_csv(std::slice::from_ref(&first), &path).unwrap();
        let second = SummaryRow::from_results("b.pdf", &[]);
        write_summary_csv(&[first, second], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.matches("a.pdf").count(), 1);
        assert!(written.contains("b.pdf,0,0,0,,\n"));
    }
}
