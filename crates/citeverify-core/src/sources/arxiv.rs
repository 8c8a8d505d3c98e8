use std::future::Future;
use std::pin::Pin;

use super::{Source, SourceContext, lookup_failed};
use crate::matching::{
    authors_match, normalize_title, normalized_titles_match, similarity, surname_of,
};
use crate::rate_limit::Service;
use crate::{Reference, VerificationResult};

const NAME: &str = "arXiv";
const QUERY_URL: &str = "https://export.arxiv.org/api/query";

/// Similarity above which a matching author surname is enough to accept a title.
const AUTHOR_ASSISTED_THRESHOLD: f64 = 70.0;

/// arXiv preprint search: exact title phrase first, then a loose all-fields query.
pub struct Arxiv {
    ctx: SourceContext,
}

/// One `<entry>` of the Atom feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ArxivEntry {
    title: String,
    authors: Vec<String>,
}

impl Arxiv {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    async fn search(&self, search_query: String) -> Result<Vec<ArxivEntry>, String> {
        let query = [
            ("search_query", search_query),
            ("max_results", "5".to_string()),
        ];
        let resp = self
            .ctx
            .get(Service::Arxiv, QUERY_URL, &query, &[])
            .await
            .map_err(|e| e.to_string())?;
        parse_entries(&resp.body)
    }
}

impl Source for Arxiv {
    fn name(&self) -> &str {
        NAME
    }

    fn verify<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> Pin<Box<dyn Future<Output = VerificationResult> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = match self.search(format!("ti:\"{}\"", reference.title)).await {
                Ok(entries) => entries,
                Err(e) => return lookup_failed(NAME, reference, e),
            };
            if entries.is_empty() {
                entries = match self.search(format!("all:{}", reference.title)).await {
                    Ok(entries) => entries,
                    Err(e) => return lookup_failed(NAME, reference, e),
                };
            }
            judge(reference, &entries)
        })
    }
}

fn judge(reference: &Reference, entries: &[ArxivEntry]) -> VerificationResult {
    let normalized_input = normalize_title(&reference.title);

    for entry in entries {
        let normalized_entry = normalize_title(&entry.title);
        let verdict = normalized_titles_match(&normalized_input, &normalized_entry);
        if verdict.is_match() {
            return VerificationResult::validated(format!(
                "Title match in arXiv ({}).",
                verdict.label()
            ));
        }

        if !normalized_entry.is_empty()
            && similarity(&normalized_input, &normalized_entry) > AUTHOR_ASSISTED_THRESHOLD
            && entry
                .authors
                .iter()
                .any(|name| authors_match(surname_of(name), &reference.first_author_surname))
        {
            return VerificationResult::validated("Author and similar title match in arXiv.");
        }
    }

    VerificationResult::not_found("No matching record found in arXiv.")
}

/// Parse the arXiv Atom feed into its entries.
fn parse_entries(xml: &str) -> Result<Vec<ArxivEntry>, String> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut in_entry = false;
    let mut in_title = false;
    let mut in_author = false;
    let mut in_name = false;

    let mut current = ArxivEntry::default();
    let mut current_name = String::new();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    in_entry = true;
                    current = ArxivEntry::default();
                }
                b"title" if in_entry => {
                    in_title = true;
                    current.title.clear();
                }
                b"author" if in_entry => {
                    in_author = true;
                    current_name.clear();
                }
                b"name" if in_author => {
                    in_name = true;
                    current_name.clear();
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                if in_title {
                    current.title.push_str(&text);
                }
                if in_name {
                    current_name.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" if in_entry => {
                    // Titles in the feed are wrapped across lines
                    current.title = current.title.split_whitespace().collect::<Vec<_>>().join(" ");
                    entries.push(std::mem::take(&mut current));
                    in_entry = false;
                }
                b"title" => in_title = false,
                b"author" => {
                    let name = current_name.trim();
                    if !name.is_empty() {
                        current.authors.push(name.to_string());
                    }
                    in_author = false;
                }
                b"name" => in_name = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}
