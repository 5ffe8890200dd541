//! Converts search records into the markup shown in the results container.
//!
//! Titles and tags are inserted as text (escaped). Excerpts come from the
//! index with `<mark>` highlighting and are treated as semi-trusted markup:
//! they pass through [`sanitize_excerpt`] before insertion.

use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::content::parse_date;
use crate::index::{IndexError, ResultRecord};

/// At most this many tag badges are shown per result.
pub const MAX_TAGS: usize = 3;

pub const NO_RESULTS_TEXT: &str = "No results found.";
pub const ASSET_MISSING_TEXT: &str = "Search index not found. Run `site index build` to generate the index, or build the site.";
pub const SEARCH_FAILED_TEXT: &str = "Search failed. Please try again.";

/// Elements removed together with everything inside them.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "svg", "math",
    "form", "input", "button", "select", "textarea", "link", "meta", "base", "frame",
    "frameset", "applet",
];

/// Inline formatting kept in excerpts (with every attribute stripped).
const ALLOWED_ELEMENTS: &[&str] = &[
    "mark", "em", "strong", "b", "i", "u", "code", "br", "span", "small", "sub", "sup",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResultCard {
    /// Position within the rendered batch, recorded as `data-index`.
    pub index: usize,
    pub href: String,
    pub title: String,
    pub date: Option<String>,
    /// Already sanitized.
    pub excerpt_html: Option<String>,
    pub tags: Vec<String>,
}

/// Content of the results container.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultsPane {
    Hint,
    Results(Vec<ResultCard>),
    NoResults,
    Error(String),
}

impl ResultsPane {
    pub fn result_count(&self) -> usize {
        match self {
            ResultsPane::Results(cards) => cards.len(),
            _ => 0,
        }
    }

    pub fn href(&self, index: usize) -> Option<&str> {
        match self {
            ResultsPane::Results(cards) => cards.get(index).map(|c| c.href.as_str()),
            _ => None,
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            ResultsPane::Hint => "<div class=\"search-hint\"><kbd>Cmd</kbd>+<kbd>K</kbd> to open \u{2022} <kbd>Esc</kbd> to close</div>".to_string(),
            ResultsPane::NoResults => {
                format!("<div class=\"search-no-results\">{}</div>", NO_RESULTS_TEXT)
            }
            ResultsPane::Error(message) => format!(
                "<div class=\"search-error\">{}</div>",
                html_escape::encode_text(message)
            ),
            ResultsPane::Results(cards) => cards.iter().map(ResultCard::to_html).collect(),
        }
    }
}

impl ResultCard {
    pub fn from_record(index: usize, record: &ResultRecord) -> Self {
        let tags = record
            .tags
            .as_deref()
            .map(split_tags)
            .unwrap_or_default();
        Self {
            index,
            href: record.url.clone(),
            title: record.title.clone(),
            date: record.date.as_deref().and_then(format_date),
            excerpt_html: Some(record.excerpt.as_str())
                .filter(|e| !e.trim().is_empty())
                .map(sanitize_excerpt),
            tags,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<a href=\"{}\" class=\"search-result\" data-index=\"{}\">",
            html_escape::encode_double_quoted_attribute(&self.href),
            self.index
        );
        html.push_str(&format!(
            "<div class=\"result-title\">{}</div>",
            html_escape::encode_text(&self.title)
        ));
        if let Some(date) = &self.date {
            html.push_str(&format!(
                "<div class=\"result-date\">{}</div>",
                html_escape::encode_text(date)
            ));
        }
        if let Some(excerpt) = &self.excerpt_html {
            html.push_str(&format!("<div class=\"result-excerpt\">{}</div>", excerpt));
        }
        if !self.tags.is_empty() {
            html.push_str("<div class=\"result-tags\">");
            for tag in self.tags.iter().take(MAX_TAGS) {
                html.push_str(&format!(
                    "<span class=\"result-tag\">#{}</span>",
                    html_escape::encode_text(tag)
                ));
            }
            html.push_str("</div>");
        }
        html.push_str("</a>");
        html
    }
}

/// Builds the pane for a batch of records. Zero records yields
/// [`ResultsPane::NoResults`].
pub fn render_results(records: &[ResultRecord]) -> ResultsPane {
    if records.is_empty() {
        return ResultsPane::NoResults;
    }
    ResultsPane::Results(
        records
            .iter()
            .enumerate()
            .map(|(i, r)| ResultCard::from_record(i, r))
            .collect(),
    )
}

pub fn error_pane(err: &IndexError) -> ResultsPane {
    let text = if err.is_asset_missing() {
        ASSET_MISSING_TEXT
    } else {
        SEARCH_FAILED_TEXT
    };
    ResultsPane::Error(text.to_string())
}

/// Comma-separated tag string → trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `2024-01-05T12:00:00Z` → `Jan 5, 2024`. Unparseable input yields `None`.
pub fn format_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format("%b %-d, %Y").to_string())
}

/// Strips executable and embedding markup from an excerpt while keeping
/// inline formatting.
///
/// Falls back to escaping the whole excerpt as text if it cannot be
/// rewritten.
pub fn sanitize_excerpt(html: &str) -> String {
    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                let tag = el.tag_name();
                if DROPPED_ELEMENTS.contains(&tag.as_str()) {
                    el.remove();
                } else if ALLOWED_ELEMENTS.contains(&tag.as_str()) {
                    let names: Vec<String> = el.attributes().iter().map(|a| a.name()).collect();
                    for name in names {
                        el.remove_attribute(&name);
                    }
                } else {
                    el.remove_and_keep_content();
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    match result {
        Ok(clean) => clean,
        Err(e) => {
            tracing::warn!(error = %e, "excerpt sanitization failed; rendering as text");
            html_escape::encode_text(html).into_owned()
        }
    }
}
