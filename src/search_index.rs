//! Builds the static search index asset from the content tree.
//!
//! The asset is a JSON array of [`IndexDocument`]s, one per published post,
//! with the Markdown body reduced to plain text. It is written by
//! `site index build`, verified by `site index check`, served at
//! `/api/search-index.json`, and read back by
//! [`StaticIndexSource`](crate::index::static_index::StaticIndexSource).

use anyhow::{Context, Result};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::content::{self, Post};
use crate::validate::{Level, Report};

/// Path prefixes that mean the asset was built against the wrong output
/// layout.
const STALE_URL_PREFIXES: &[&str] = &["/blog/", "/client/"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub slug: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub word_count: usize,
}

impl IndexDocument {
    pub fn from_post(post: &Post) -> Option<Self> {
        let title = post.title()?.to_string();
        let content = markdown_to_plain_text(&post.body);
        Some(Self {
            url: format!("/{}/", post.slug),
            slug: post.slug.clone(),
            title,
            description: post.description().unwrap_or_default().to_string(),
            word_count: content.split_whitespace().count(),
            content,
            tags: post.visible_tags(),
            author: post.author(),
            pub_date: post
                .pub_date()
                .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        })
    }
}

/// Strips Markdown syntax, keeping the readable text.
///
/// Code blocks keep their contents; HTML/JSX blocks are dropped.
pub fn markdown_to_plain_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_html = false;

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => {
                if !in_html {
                    out.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::Start(Tag::HtmlBlock) => in_html = true,
            Event::End(TagEnd::HtmlBlock) => in_html = false,
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableCell,
            ) => out.push('\n'),
            _ => {}
        }
    }

    out.split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_documents(config: &Config) -> Result<Vec<IndexDocument>> {
    let posts = content::published_posts(&config.content)?;
    Ok(posts.iter().filter_map(IndexDocument::from_post).collect())
}

/// `site index build`: writes the index asset and reports the count.
pub fn run_index_build(config: &Config, output: Option<&Path>) -> Result<()> {
    let docs = build_documents(config)?;
    let path = output.unwrap_or(&config.search.index_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string(&docs)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write search index to {}", path.display()))?;

    println!("Indexed {} documents → {}", docs.len(), path.display());
    Ok(())
}

/// Verifies a built index asset without loading it into a search engine.
///
/// A missing or unparsable asset is a single error. Otherwise every
/// document is checked for a usable URL and title, and slugs and URLs must
/// be unique.
pub fn check_index(path: &Path) -> Report {
    let mut report = Report::default();
    let display = path.display().to_string();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            report.record(
                Level::Error,
                &display,
                format!("Search index not readable ({}). Run: site index build", e),
            );
            return report;
        }
    };
    let docs: Vec<IndexDocument> = match serde_json::from_str(&raw) {
        Ok(docs) => docs,
        Err(e) => {
            report.record(
                Level::Error,
                &display,
                format!("Search index is not valid JSON: {}", e),
            );
            return report;
        }
    };
    report.files_checked = docs.len();

    if docs.is_empty() {
        report.record(Level::Warn, &display, "Search index contains no documents.");
        return report;
    }

    let mut slugs: HashMap<&str, usize> = HashMap::new();
    let mut urls: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        *slugs.entry(doc.slug.as_str()).or_default() += 1;
        *urls.entry(doc.url.as_str()).or_default() += 1;

        if doc.title.trim().is_empty() {
            report.record(Level::Error, &doc.slug, "Document has an empty title.");
        }
        if !doc.url.starts_with('/') || doc.url.starts_with("//") || !doc.url.ends_with('/') {
            report.record(
                Level::Error,
                &doc.slug,
                format!("Malformed URL `{}`; expected a root-relative `/<slug>/` path.", doc.url),
            );
        } else if let Some(prefix) = STALE_URL_PREFIXES.iter().find(|p| doc.url.starts_with(*p)) {
            report.record(
                Level::Error,
                &doc.slug,
                format!("URL `{}` carries the stale `{}` prefix.", doc.url, prefix),
            );
        } else if doc.url != format!("/{}/", doc.slug) {
            report.record(
                Level::Warn,
                &doc.slug,
                format!("URL `{}` does not match slug.", doc.url),
            );
        }
    }

    let mut duplicate_slugs: Vec<_> = slugs.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicate_slugs.sort();
    for (slug, n) in duplicate_slugs {
        report.record(Level::Error, slug, format!("Slug indexed {} times.", n));
    }
    let mut duplicate_urls: Vec<_> = urls.into_iter().filter(|(_, n)| *n > 1).collect();
    duplicate_urls.sort();
    for (url, n) in duplicate_urls {
        report.record(Level::Error, url, format!("URL indexed {} times.", n));
    }

    report
}

/// `site index check`: prints every finding and a summary. Returns whether
/// the asset is free of errors.
pub fn run_index_check(config: &Config) -> Result<bool> {
    let path = &config.search.index_path;
    let report = check_index(path);

    if report.findings.is_empty() {
        println!(
            "✅ Search index at {} looks good ({} documents).",
            path.display(),
            report.files_checked
        );
        return Ok(true);
    }

    for finding in &report.findings {
        println!("{}", finding);
    }
    println!();
    println!(
        "Summary: {} error(s), {} warning(s).",
        report.error_count(),
        report.warning_count()
    );
    Ok(!report.has_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(slug: &str, url: &str) -> IndexDocument {
        IndexDocument {
            slug: slug.to_string(),
            url: url.to_string(),
            title: slug.to_uppercase(),
            description: String::new(),
            content: "text".to_string(),
            tags: Vec::new(),
            author: String::new(),
            pub_date: None,
            word_count: 1,
        }
    }

    fn write_index(tmp: &TempDir, docs: &[IndexDocument]) -> std::path::PathBuf {
        let path = tmp.path().join("search-index.json");
        std::fs::write(&path, serde_json::to_string(docs).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_plain_text_strips_syntax() {
        let md = "# Title\n\nSome **bold** and [a link](https://x.y) with `code`.\n\n- one\n- two\n";
        let text = markdown_to_plain_text(md);
        assert_eq!(text, "Title\nSome bold and a link with code.\none\ntwo");
    }

    #[test]
    fn test_plain_text_drops_html_blocks() {
        let md = "<div class=\"cta\">\nSubscribe now\n</div>\n\nReal text.\n";
        let text = markdown_to_plain_text(md);
        assert!(!text.contains("Subscribe"));
        assert!(text.contains("Real text."));
    }

    #[test]
    fn test_document_from_post() {
        let src = "---\ntitle: Focus\ndescription: d\npubDate: 2024-02-01\ntags: [hash-x, productivity]\n---\nDeep *focus* work.\n";
        let post = Post::from_source(Path::new("focus.md"), "focus.md", src).unwrap();
        let doc = IndexDocument::from_post(&post).unwrap();
        assert_eq!(doc.url, "/focus/");
        assert_eq!(doc.content, "Deep focus work.");
        assert_eq!(doc.tags, vec!["productivity"]);
        assert_eq!(doc.word_count, 3);
        assert_eq!(doc.pub_date.as_deref(), Some("2024-02-01T00:00:00.000Z"));
    }

    #[test]
    fn test_check_accepts_clean_index() {
        let tmp = TempDir::new().unwrap();
        let path = write_index(&tmp, &[doc("deep-work", "/deep-work/"), doc("sleep", "/sleep/")]);
        let report = check_index(&path);
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert_eq!(report.files_checked, 2);
    }

    #[test]
    fn test_check_missing_and_unparsable_asset() {
        let tmp = TempDir::new().unwrap();
        let missing = check_index(&tmp.path().join("nope.json"));
        assert_eq!(missing.error_count(), 1);
        assert!(missing.findings[0].message.contains("Run: site index build"));

        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let broken = check_index(&path);
        assert_eq!(broken.error_count(), 1);
        assert!(broken.findings[0].message.starts_with("Search index is not valid JSON"));
    }

    #[test]
    fn test_check_flags_duplicates_and_bad_urls() {
        let tmp = TempDir::new().unwrap();
        let path = write_index(
            &tmp,
            &[
                doc("deep-work", "/deep-work/"),
                doc("deep-work", "/deep-work-2/"),
                doc("old", "/blog/old/"),
                doc("abs", "https://example.com/abs/"),
                doc("moved", "/elsewhere/"),
            ],
        );
        let report = check_index(&path);
        let messages: Vec<String> = report.findings.iter().map(|f| f.to_string()).collect();

        assert!(messages.contains(&"[ERROR] deep-work — Slug indexed 2 times.".to_string()));
        assert!(messages
            .iter()
            .any(|m| m.starts_with("[ERROR] old — URL `/blog/old/` carries the stale `/blog/` prefix")));
        assert!(messages
            .iter()
            .any(|m| m.starts_with("[ERROR] abs — Malformed URL")));
        assert!(messages.contains(&"[WARN] moved — URL `/elsewhere/` does not match slug.".to_string()));
        // deep-work-2 also mismatches its slug.
        assert_eq!(report.error_count(), 3);
        assert_eq!(report.warning_count(), 2);
    }

    #[test]
    fn test_check_warns_on_empty_index() {
        let tmp = TempDir::new().unwrap();
        let path = write_index(&tmp, &[]);
        let report = check_index(&path);
        assert!(!report.has_errors());
        assert_eq!(report.warning_count(), 1);
    }
}
