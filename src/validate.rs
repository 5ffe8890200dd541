//! Frontmatter validation for the content tree.
//!
//! `site validate` walks every Markdown/MDX file under the content root and
//! checks its frontmatter. Findings are either errors (the build would ship
//! broken or missing metadata) or warnings (discoverability and
//! accessibility hints). Any error makes the command exit non-zero.
//!
//! # Rules
//!
//! | Level | Rule |
//! |-------|------|
//! | error | frontmatter cannot be parsed |
//! | error | `title`, `description` or `pubDate` missing or blank |
//! | error | `pubDate` is not a valid date |
//! | error | two files share a slug (each file is reported) |
//! | warn  | `pubDate` in the future without `draft: true` |
//! | warn  | non-page entry without tags |
//! | warn  | internal `hash-` tags present |
//! | warn  | `featured` without `hero` or `image.url` |
//! | warn  | `image` without alt text |
//! | warn  | `topics` not an array of non-empty strings |
//! | warn  | `readingTime` not a positive number |

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::ContentConfig;
use crate::content::{self, truthy, value_to_date, INTERNAL_TAG_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "ERROR"),
            Level::Warn => write!(f, "WARN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub level: Level,
    pub file: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} — {}", self.level, self.file, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub files_checked: usize,
}

impl Report {
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.level == Level::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub(crate) fn record(&mut self, level: Level, file: &str, message: impl Into<String>) {
        self.findings.push(Finding {
            level,
            file: file.to_string(),
            message: message.into(),
        });
    }
}

/// Checks every content file. Only I/O failures while listing or reading
/// files are returned as `Err`; everything else becomes a finding.
pub fn validate_content(config: &ContentConfig, now: DateTime<Utc>) -> Result<Report> {
    let mut report = Report::default();
    let mut slugs: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (path, rel) in content::list_content_files(config)? {
        let display = path.display().to_string();
        report.files_checked += 1;

        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", display))?;
        let data = match content::parse_frontmatter(&source) {
            Ok((data, _)) => data,
            Err(e) => {
                report.record(
                    Level::Error,
                    &display,
                    format!("Unable to parse frontmatter ({:#}).", e),
                );
                continue;
            }
        };

        slugs
            .entry(content::slug_for(&rel))
            .or_default()
            .push(display.clone());

        check_entry(&mut report, &display, &data, now);
    }

    for (slug, files) in &slugs {
        if files.len() > 1 {
            let list = files.join(", ");
            for file in files {
                report.record(
                    Level::Error,
                    file,
                    format!("Duplicate slug \"{}\" also used in: {}.", slug, list),
                );
            }
        }
    }

    Ok(report)
}

fn check_entry(report: &mut Report, file: &str, data: &Map<String, Value>, now: DateTime<Utc>) {
    let is_page = data.get("page").is_some_and(truthy);
    let is_draft = data.get("draft").is_some_and(truthy);

    if !has_text(data.get("title")) {
        report.record(Level::Error, file, "Missing required `title` field.");
    }
    if !has_text(data.get("description")) {
        report.record(Level::Error, file, "Missing required `description` field.");
    }

    match data.get("pubDate").filter(|v| truthy(v)) {
        None => report.record(Level::Error, file, "Missing required `pubDate` field."),
        Some(raw) => match value_to_date(raw) {
            None => report.record(Level::Error, file, "`pubDate` is not a valid date."),
            Some(date) if date > now && !is_draft => report.record(
                Level::Warn,
                file,
                "Future-dated entry should be marked `draft: true`.",
            ),
            Some(_) => {}
        },
    }

    let tags = data.get("tags").and_then(Value::as_array);
    let tag_count = tags.map_or(0, |tags| {
        tags.iter()
            .filter(|t| !value_as_text(t).trim().is_empty())
            .count()
    });
    if !is_page && tag_count == 0 {
        report.record(Level::Warn, file, "Add at least one tag to improve discovery.");
    }

    let internal: Vec<&str> = tags
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|t| t.starts_with(INTERNAL_TAG_PREFIX))
        .collect();
    if !internal.is_empty() {
        report.record(
            Level::Warn,
            file,
            format!(
                "Remove internal hash- tags from published content: {}.",
                internal.join(", ")
            ),
        );
    }

    let image = data.get("image").filter(|v| truthy(v));
    let image_url = image.and_then(|i| i.get("url")).is_some_and(truthy);
    let has_hero = data.get("hero").is_some_and(truthy) || image_url;
    if data.get("featured").is_some_and(truthy) && !has_hero {
        report.record(
            Level::Warn,
            file,
            "Featured entry should include a `hero` image or `image.url`.",
        );
    }

    if let Some(image) = image {
        let alt = image
            .get("alt")
            .filter(|v| truthy(v))
            .map(value_as_text)
            .unwrap_or_default();
        if alt.trim().is_empty() {
            report.record(Level::Warn, file, "Provide descriptive alt text for `image.alt`.");
        }
    }

    match data.get("topics") {
        None | Some(Value::Null) => {}
        Some(Value::Array(topics)) => {
            let invalid = topics
                .iter()
                .any(|t| t.as_str().map_or(true, |s| s.trim().is_empty()));
            if invalid {
                report.record(
                    Level::Warn,
                    file,
                    "`topics` contains empty or non-string values.",
                );
            }
        }
        Some(_) => report.record(Level::Warn, file, "`topics` should be an array of strings."),
    }

    match data.get("readingTime") {
        None | Some(Value::Null) => {}
        Some(v) if v.as_f64().is_some_and(|m| m > 0.0) => {}
        Some(_) => report.record(
            Level::Warn,
            file,
            "`readingTime` should be a positive number expressed in minutes.",
        ),
    }
}

fn has_text(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `site validate`: prints every finding and a summary. Returns whether
/// the content is free of errors.
pub fn run_validate(config: &ContentConfig) -> Result<bool> {
    let report = validate_content(config, Utc::now())?;

    if report.findings.is_empty() {
        println!(
            "✅ Content frontmatter looks great ({} files).",
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
