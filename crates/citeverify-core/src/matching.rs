use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Similarity ratio (0–100) a pair of normalized titles must exceed to count
/// as a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 85.0;

/// How two titles were found to denote the same work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMatch {
    Exact,
    Partial,
    Fuzzy,
    None,
}

impl TitleMatch {
    /// Whether this is any kind of positive match.
    pub fn is_match(self) -> bool {
        !matches!(self, TitleMatch::None)
    }

    /// Whether this is an exact or substring match (no fuzzy tolerance).
    pub fn is_verbatim(self) -> bool {
        matches!(self, TitleMatch::Exact | TitleMatch::Partial)
    }

    /// Label used in verification explanations.
    pub fn label(self) -> &'static str {
        match self {
            TitleMatch::Exact => "exact match",
            TitleMatch::Partial => "partial match",
            TitleMatch::Fuzzy => "fuzzy match",
            TitleMatch::None => "no match",
        }
    }
}

/// Transliterate to the closest ASCII spelling.
///
/// Input is NFC-composed first so decomposed accents transliterate the same
/// as precomposed ones. Every script gets a romanization ("Глубокое" →
/// "Glubokoe", "深度" → "Shen Du").
fn transliterate(title: &str) -> String {
    let composed: String = title.nfc().collect();
    deunicode::deunicode(&composed)
}

/// Normalize a title for comparison.
///
/// Steps (order matters):
/// 1. Transliterate to ASCII (e.g. "Déjà" → "Deja")
/// 2. Drop everything that is not a letter, digit or whitespace
/// 3. Lowercase
/// 4. Remove the standalone words "and" and "the"
/// 5. Collapse whitespace and trim
pub fn normalize_title(title: &str) -> String {
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9\s]").unwrap());
    static STOP_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:and|the)\b").unwrap());

    let ascii = transliterate(title);
    let stripped = NON_ALNUM.replace_all(&ascii, "").to_lowercase();
    let without_stop_words = STOP_WORDS.replace_all(&stripped, " ");
    without_stop_words
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Edit-similarity ratio of two already-normalized strings on a 0–100 scale.
pub fn similarity(norm_a: &str, norm_b: &str) -> f64 {
    rapidfuzz::fuzz::ratio(norm_a.chars(), norm_b.chars()) * 100.0
}

/// Compare two titles after normalization.
pub fn titles_match(title_a: &str, title_b: &str) -> TitleMatch {
    normalized_titles_match(&normalize_title(title_a), &normalize_title(title_b))
}

/// Compare two titles that have already been passed through [`normalize_title`].
pub fn normalized_titles_match(norm_a: &str, norm_b: &str) -> TitleMatch {
    if norm_a.is_empty() || norm_b.is_empty() {
        return TitleMatch::None;
    }
    if norm_a == norm_b {
        return TitleMatch::Exact;
    }
    if norm_a.contains(norm_b) || norm_b.contains(norm_a) {
        return TitleMatch::Partial;
    }
    if similarity(norm_a, norm_b) > FUZZY_THRESHOLD {
        return TitleMatch::Fuzzy;
    }
    TitleMatch::None
}

/// Case-insensitive surname equality. Author names are short, so there is
/// deliberately no fuzzy tolerance here.
pub fn authors_match(surname_a: &str, surname_b: &str) -> bool {
    let a = surname_a.trim();
    let b = surname_b.trim();
    !a.is_empty() && !b.is_empty() && a.to_lowercase() == b.to_lowercase()
}

/// Last whitespace-separated token of a full name ("Ashish Vaswani" → "Vaswani").
pub fn surname_of(full_name: &str) -> &str {
    full_name.split_whitespace().last().unwrap_or("")
}

/// Strip resolver prefixes and surrounding whitespace from a DOI.
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim();
    let lower = trimmed.to_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if lower.starts_with(prefix) {
            return lower[prefix.len()..].trim().to_string();
        }
    }
    lower
}

/// Case-insensitive DOI equality. Both sides must be non-empty.
pub fn dois_match(doi_a: &str, doi_b: &str) -> bool {
    let a = normalize_doi(doi_a);
    let b = normalize_doi(doi_b);
    !a.is_empty() && !b.is_empty() && a == b
}
