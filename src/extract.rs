//! Content extraction: normalized text and metadata from raw HTML.

use scraper::{ElementRef, Html, Selector};

use crate::types::IngestError;

/// Structural tags whose contents are never treated as page content.
const EXCLUDED_CONTAINERS: [&str; 6] = ["script", "style", "header", "footer", "nav", "aside"];

/// Normalized text plus metadata for one successfully fetched page.
///
/// `text` excludes markup, scripts, and boilerplate regions; `title` is
/// best-effort and may be empty. Immutable once created.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub source_url: String,
    pub title: String,
    pub text: String,
}

/// Extracts content-bearing text from `raw_html`.
///
/// Text is collected strictly from paragraph elements outside the excluded
/// containers, favoring precision over exhaustiveness: prose nested inside a
/// `<nav>` or `<aside>` is dropped. Missing optional fields never fail; the
/// title degrades to an empty string.
pub fn extract(raw_html: &str, source_url: &str) -> Result<ExtractedPage, IngestError> {
    let document = Html::parse_document(raw_html);
    let paragraphs =
        Selector::parse("p").map_err(|err| IngestError::Parse(err.to_string()))?;
    let titles = Selector::parse("title").map_err(|err| IngestError::Parse(err.to_string()))?;

    let mut sections = Vec::new();
    for element in document.select(&paragraphs) {
        if has_excluded_ancestor(&element) {
            continue;
        }
        let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            sections.push(text);
        }
    }

    let title = document
        .select(&titles)
        .next()
        .map(|element| normalize_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    Ok(ExtractedPage {
        source_url: source_url.to_string(),
        title,
        text: sections.join("\n\n"),
    })
}

fn has_excluded_ancestor(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| EXCLUDED_CONTAINERS.contains(&ancestor.value().name()))
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_paragraph_text_only() {
        let html = r#"<html><head><title>Doc</title></head><body>
            <h1>Heading</h1>
            <p>First paragraph.</p>
            <div>loose div text</div>
            <p>Second paragraph.</p>
        </body></html>"#;
        let page = extract(html, "https://site/doc").unwrap();
        assert_eq!(page.title, "Doc");
        assert_eq!(page.text, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn boilerplate_containers_are_excluded() {
        let html = r#"<html><body>
            <nav><p>navigation links</p></nav>
            <header><p>site header</p></header>
            <p>Actual content.</p>
            <aside><p>related articles</p></aside>
            <footer><p>copyright</p></footer>
        </body></html>"#;
        let page = extract(html, "https://site/doc").unwrap();
        assert_eq!(page.text, "Actual content.");
    }

    #[test]
    fn deeply_nested_boilerplate_is_excluded() {
        let html = r#"<html><body>
            <nav><div><ul><li><p>nested nav prose</p></li></ul></div></nav>
            <article><p>Body text.</p></article>
        </body></html>"#;
        let page = extract(html, "https://site/doc").unwrap();
        assert_eq!(page.text, "Body text.");
    }

    #[test]
    fn missing_title_yields_empty_string() {
        let page = extract("<html><body><p>Text.</p></body></html>", "https://site").unwrap();
        assert_eq!(page.title, "");
        assert_eq!(page.source_url, "https://site");
    }

    #[test]
    fn whitespace_is_normalized() {
        let html = "<html><body><p>  spaced\n\n   out\ttext </p></body></html>";
        let page = extract(html, "https://site").unwrap();
        assert_eq!(page.text, "spaced out text");
    }

    #[test]
    fn empty_body_yields_empty_text() {
        let page = extract("<html><body></body></html>", "https://site").unwrap();
        assert!(page.text.is_empty());
    }
}
