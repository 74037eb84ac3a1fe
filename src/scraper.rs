use std::fmt;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;

use crate::validator::UrlValidator;

pub const NO_TITLE: &str = "No title found";

/// Elements whose contents never count as visible text.
const HIDDEN_TAGS: [&str; 3] = ["script", "style", "input"];

/// How many link checks may be in flight at once.
const LINK_CHECK_CONCURRENCY: usize = 8;

// Create static selectors to avoid recompiling them each time
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to parse title selector")
});
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img").expect("Failed to parse img selector")
});
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a").expect("Failed to parse anchor selector")
});
static TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table").expect("Failed to parse table selector")
});
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script").expect("Failed to parse script selector")
});

/// Everything scraped from one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub tables: Vec<String>,
    pub scripts: Vec<String>,
}

impl PageRecord {
    /// The record a page starts as, and stays as when loading fails.
    pub fn placeholder(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: NO_TITLE.to_string(),
            text: String::new(),
            links: Vec::new(),
            images: Vec::new(),
            tables: Vec::new(),
            scripts: Vec::new(),
        }
    }

    /// Build a record from rendered markup. Links that fail `validator`
    /// are dropped.
    pub async fn from_html(url: &str, html: &str, validator: &UrlValidator) -> Self {
        let extracted = extract(html);

        let checks = extracted.link_candidates.into_iter().map(move |href| async move {
            let safe = validator.is_safe(&href).await;
            (href, safe)
        });
        let links: Vec<String> = stream::iter(checks)
            .buffered(LINK_CHECK_CONCURRENCY)
            .filter_map(|(href, safe)| async move { safe.then_some(href) })
            .collect()
            .await;

        tracing::debug!(
            url,
            text_chars = extracted.text.chars().count(),
            links = links.len(),
            images = extracted.images.len(),
            tables = extracted.tables.len(),
            scripts = extracted.scripts.len(),
            "extracted page"
        );

        Self {
            url: url.to_string(),
            title: extracted.title,
            text: extracted.text,
            links,
            images: extracted.images,
            tables: extracted.tables,
            scripts: extracted.scripts,
        }
    }
}

impl fmt::Display for PageRecord {
    /// Human-readable contents report with text and links truncated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self.text.chars().take(1000).collect();
        let links: Vec<&str> = self.links.iter().take(20).map(String::as_str).collect();

        writeln!(f, "-> Webpage Title:\n{}\n\n", self.title)?;
        writeln!(
            f,
            "-> Webpage Contents (limited text displayed up to 1000 characters):\n{text}\n\n"
        )?;
        writeln!(f, "-> Links (limited to 20 links displayed):\n{links:?}\n\n")?;
        writeln!(f, "-> Images:\n{:?}\n\n", self.images)?;
        writeln!(f, "-> Tables:\n{:?}\n\n", self.tables)?;
        writeln!(f, "-> Scripts:\n{:?}", self.scripts)
    }
}

/// Synchronous extraction result; links are not yet validated.
///
/// `Html` is not `Send`, so parsing stays out of async code.
struct Extracted {
    title: String,
    text: String,
    images: Vec<String>,
    link_candidates: Vec<String>,
    tables: Vec<String>,
    scripts: Vec<String>,
}

fn extract(html: &str) -> Extracted {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = document
        .select(&BODY_SELECTOR)
        .next()
        .map(visible_text)
        .unwrap_or_default();
    let images = attribute_values(&document, &IMG_SELECTOR, "src");
    let link_candidates = attribute_values(&document, &ANCHOR_SELECTOR, "href");
    let tables = document.select(&TABLE_SELECTOR).map(|t| t.html()).collect();
    // The parse is never mutated, so scripts survive the text pass.
    let scripts = document.select(&SCRIPT_SELECTOR).map(|s| s.html()).collect();

    Extracted {
        title,
        text,
        images,
        link_candidates,
        tables,
        scripts,
    }
}

fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

/// Stripped text nodes of `body`, skipping hidden subtrees, joined by a
/// single space.
fn visible_text(body: ElementRef<'_>) -> String {
    let mut pieces = Vec::new();

    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed);
        }
    }

    pieces.join(" ")
}

fn attribute_values(document: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
