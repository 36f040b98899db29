//! Narrow query interface over server-rendered HTML.
//!
//! Protocol code only ever asks two questions of a page: "which `<tag>`
//! elements have attribute X equal to Y" and "which `<tag>` elements contain
//! text Z". Keeping that behind [`DocumentQuery`] lets the scraping technique
//! change without touching the CSRF or classification logic.
//!
//! All entry points are synchronous; parsed documents are not `Send` and must
//! not be held across an `.await`.

use scraper::{ElementRef, Html, Selector};

/// An element picked out of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Concatenated text of the element and its descendants, unmodified.
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Queries the protocol layer needs from a page.
pub trait DocumentQuery {
    /// Elements named `tag` whose `attribute` is exactly `value`.
    fn find_by_attribute(&self, tag: &str, attribute: &str, value: &str) -> Vec<Element>;

    /// Elements named `tag` whose text contains `needle`.
    fn find_by_text(&self, tag: &str, needle: &str) -> Vec<Element>;
}

/// [`DocumentQuery`] backed by a `scraper` DOM.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    /// Parse `text` leniently; malformed markup never fails.
    pub fn parse(text: &str) -> Self {
        Self {
            html: Html::parse_document(text),
        }
    }

    fn elements<'a>(&'a self, tag: &str) -> Vec<ElementRef<'a>> {
        match Selector::parse(tag) {
            Ok(sel) => self.html.select(&sel).collect(),
            Err(e) => {
                tracing::warn!("unusable tag selector {tag:?}: {e:?}");
                Vec::new()
            }
        }
    }
}

impl DocumentQuery for HtmlDocument {
    fn find_by_attribute(&self, tag: &str, attribute: &str, value: &str) -> Vec<Element> {
        self.elements(tag)
            .into_iter()
            .filter(|el| el.value().attr(attribute) == Some(value))
            .map(to_element)
            .collect()
    }

    fn find_by_text(&self, tag: &str, needle: &str) -> Vec<Element> {
        self.elements(tag)
            .into_iter()
            .map(to_element)
            .filter(|el| el.text.contains(needle))
            .collect()
    }
}

fn to_element(el: ElementRef<'_>) -> Element {
    Element {
        text: el.text().collect::<String>(),
        attributes: el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}
