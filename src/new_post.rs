//! Scaffolding for new posts (`site new`).
//!
//! Creates `<slug>.mdx` in the content root with a draft frontmatter block.
//! When the file already exists a numeric suffix is appended
//! (`<slug>-2.mdx`, `<slug>-3.mdx`, ...).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};

use crate::config::Config;

const MAX_SLUG_LEN: usize = 80;

/// Lowercases, transliterates German umlauts, and collapses every run of
/// other characters into a single `-`. Capped at 80 characters.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.to_lowercase().chars() {
        let replacement = match c {
            'ä' => Some("ae"),
            'ö' => Some("oe"),
            'ü' => Some("ue"),
            'ß' => Some("ss"),
            _ => None,
        };
        match replacement {
            Some(s) => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push_str(s);
            }
            None if c.is_ascii_lowercase() || c.is_ascii_digit() => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(c);
            }
            None => pending_dash = true,
        }
    }

    let mut slug: String = out.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// First free `<slug>.mdx` / `<slug>-N.mdx` path in `dir`.
pub fn unique_path(dir: &Path, slug: &str) -> PathBuf {
    let mut path = dir.join(format!("{}.mdx", slug));
    let mut counter = 2;
    while path.exists() {
        path = dir.join(format!("{}-{}.mdx", slug, counter));
        counter += 1;
    }
    path
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub tags: &'a [String],
    pub author: &'a str,
    pub date: NaiveDate,
}

impl NewPost<'_> {
    pub fn render(&self) -> String {
        let description = self
            .description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(self.title);

        let tags: Vec<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let tags_yaml = if tags.is_empty() {
            " []".to_string()
        } else {
            tags.iter().map(|t| format!("\n  - {}", t)).collect()
        };

        format!(
            "---\ntitle: {title}\ndescription: {description}\npubDate: {date}T12:00:00.000Z\nauthor: {author}\ntags:{tags}\nfeatured: false\ndraft: true\n---\n\n# {heading}\n\nStart writing here...\n",
            title = quoted(self.title),
            description = quoted(description),
            date = self.date.format("%Y-%m-%d"),
            author = self.author,
            tags = tags_yaml,
            heading = self.title,
        )
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `site new`: writes the draft and returns its path.
pub fn run_new_post(
    config: &Config,
    title: &str,
    description: Option<&str>,
    tags: &[String],
) -> Result<PathBuf> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Title required");
    }
    let slug = slugify(title);
    if slug.is_empty() {
        bail!("Title \"{}\" does not produce a usable slug", title);
    }

    let dir = &config.content.root;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = unique_path(dir, &slug);

    let post = NewPost {
        title,
        description,
        tags,
        author: &config.site.author,
        date: Utc::now().date_naive(),
    };
    std::fs::write(&path, post.render())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created: {}", path.display());
    println!("   Slug: {}", slug);
    println!(
        "   Tags: {}",
        if tags.is_empty() {
            "(none)".to_string()
        } else {
            tags.join(", ")
        }
    );
    println!("   Draft: true (publish by setting draft: false)");
    Ok(path)
}
