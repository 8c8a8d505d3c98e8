use thiserror::Error;

/// Headings that usually open a bibliography.
pub const DEFAULT_KEYWORDS: [&str; 3] = ["Reference", "Bibliography", "Works Cited"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BibliographyError {
    #[error("no bibliography section found (looked for: {})", .keywords.join(", "))]
    NoBibliography { keywords: Vec<String> },
}

/// Slice off the bibliography: everything from the last case-insensitive
/// occurrence of any keyword onward.
///
/// The last occurrence wins so that in-text mentions ("see the references
/// below") do not pull the body of the paper into the slice.
pub fn find_bibliography_section<'a>(
    text: &'a str,
    keywords: &[&str],
) -> Result<&'a str, BibliographyError> {
    let lower = text.to_lowercase();
    // Lowercasing may change byte lengths; only trust offsets when it did not
    let haystack = if lower.len() == text.len() {
        lower
    } else {
        text.chars()
            .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
            .collect()
    };

    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .filter_map(|k| haystack.rfind(&k.to_ascii_lowercase()))
        .max()
        .map(|start| &text[start..])
        .ok_or_else(|| BibliographyError::NoBibliography {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        })
}
