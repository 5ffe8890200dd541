//! Content tree scanning and frontmatter parsing.
//!
//! Posts are Markdown/MDX files under `[content].root`. Each starts with a
//! YAML frontmatter block delimited by `---` lines. The slug of a post is
//! its path relative to the content root, without extension, using `/`
//! separators (`guides/focus.mdx` → `guides/focus`).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{default_author, ContentConfig};

/// Prefix marking internal tags that readers never see.
pub const INTERNAL_TAG_PREFIX: &str = "hash-";

/// A content file with parsed frontmatter.
#[derive(Debug, Clone)]
pub struct Post {
    pub path: PathBuf,
    /// Path relative to the content root, `/`-separated.
    pub rel_path: String,
    pub slug: String,
    pub data: Map<String, Value>,
    pub body: String,
}

impl Post {
    pub fn from_source(path: &Path, rel_path: &str, source: &str) -> Result<Self> {
        let (data, body) = parse_frontmatter(source)?;
        Ok(Self {
            path: path.to_path_buf(),
            rel_path: rel_path.to_string(),
            slug: slug_for(rel_path),
            data,
            body: body.to_string(),
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    pub fn author(&self) -> String {
        self.str_field("author")
            .map(str::to_string)
            .unwrap_or_else(default_author)
    }

    pub fn pub_date(&self) -> Option<DateTime<Utc>> {
        self.data.get("pubDate").and_then(value_to_date)
    }

    pub fn is_draft(&self) -> bool {
        self.bool_field("draft")
    }

    pub fn is_featured(&self) -> bool {
        self.bool_field("featured")
    }

    pub fn is_page(&self) -> bool {
        self.data.get("page").is_some_and(truthy)
    }

    /// All tags, trimmed, empty entries dropped. A scalar `tags` value is
    /// treated as a single tag.
    pub fn tags(&self) -> Vec<String> {
        tags_from_value(self.data.get("tags"))
    }

    /// Tags without the internal `hash-` ones.
    pub fn visible_tags(&self) -> Vec<String> {
        self.tags()
            .into_iter()
            .filter(|t| !is_internal_tag(t))
            .collect()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn bool_field(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

pub fn is_internal_tag(tag: &str) -> bool {
    tag.to_lowercase().starts_with(INTERNAL_TAG_PREFIX)
}

pub fn tags_from_value(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string().trim().to_string(),
            })
            .filter(|t| !t.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// JavaScript-style truthiness for loosely typed frontmatter flags.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn slug_for(rel_path: &str) -> String {
    let normalized = rel_path.replace('\\', "/");
    match normalized.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.contains('/')
                && matches!(ext.to_lowercase().as_str(), "md" | "mdx") =>
        {
            stem.to_string()
        }
        _ => normalized,
    }
}

/// Splits `source` into its YAML frontmatter text and body.
///
/// Returns `None` when the file does not open with a `---` line or the
/// block is never closed.
pub fn split_frontmatter(source: &str) -> Option<(&str, &str)> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let rest = source
        .strip_prefix("---\r\n")
        .or_else(|| source.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parses frontmatter into a JSON-style map. Files without frontmatter
/// yield an empty map and the whole source as body.
pub fn parse_frontmatter(source: &str) -> Result<(Map<String, Value>, &str)> {
    let Some((yaml, body)) = split_frontmatter(source) else {
        if source.trim_start_matches('\u{feff}').starts_with("---") {
            bail!("frontmatter block is not closed");
        }
        return Ok((Map::new(), source));
    };

    if yaml.trim().is_empty() {
        return Ok((Map::new(), body));
    }

    let value: Value = serde_yaml::from_str(yaml).context("invalid YAML frontmatter")?;
    match value {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((Map::new(), body)),
        other => bail!("frontmatter must be a mapping, found {}", type_name(&other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Parses the date shapes found in frontmatter and index metadata.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn value_to_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Lists content files under the configured root, sorted by relative path.
///
/// Returns `(absolute path, relative path)` pairs. Dotfiles and dot
/// directories are skipped.
pub fn list_content_files(config: &ContentConfig) -> Result<Vec<(PathBuf, String)>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Content directory not found: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/node_modules/**".to_string()];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    });
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Loads every content file. Fails on the first unreadable or unparseable
/// file.
pub fn load_posts(config: &ContentConfig) -> Result<Vec<Post>> {
    list_content_files(config)?
        .into_iter()
        .map(|(path, rel)| {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Post::from_source(&path, &rel, &source)
                .with_context(|| format!("Failed to parse frontmatter in {}", rel))
        })
        .collect()
}

/// Published posts: non-draft entries with a title and a valid `pubDate`,
/// newest first.
pub fn published_posts(config: &ContentConfig) -> Result<Vec<Post>> {
    let mut posts: Vec<Post> = load_posts(config)?
        .into_iter()
        .filter(|p| !p.is_draft())
        .filter(|p| {
            let ok = p.title().is_some() && p.pub_date().is_some();
            if !ok {
                tracing::warn!(file = %p.rel_path, "skipping post without title or valid pubDate");
            }
            ok
        })
        .collect();
    posts.sort_by(|a, b| b.pub_date().cmp(&a.pub_date()).then(a.slug.cmp(&b.slug)));
    Ok(posts)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const POST: &str = "---\ntitle: \"Deep Work\"\ndescription: Focus better\npubDate: 2024-01-05T12:00:00.000Z\ntags:\n  - hash-import\n  - productivity\n  - \" focus \"\ndraft: false\n---\n\n# Deep Work\n\nBody text.\n";

    #[test]
    fn test_parse_post_fields() {
        let post = Post::from_source(Path::new("/c/deep-work.mdx"), "deep-work.mdx", POST).unwrap();
        assert_eq!(post.slug, "deep-work");
        assert_eq!(post.title(), Some("Deep Work"));
        assert_eq!(post.description(), Some("Focus better"));
        assert_eq!(post.pub_date().unwrap().day(), 5);
        assert_eq!(post.tags(), vec!["hash-import", "productivity", "focus"]);
        assert_eq!(post.visible_tags(), vec!["productivity", "focus"]);
        assert!(!post.is_draft());
        assert_eq!(post.author(), "Lukas Zangerl");
        assert!(post.body.contains("Body text."));
    }

    #[test]
    fn test_no_frontmatter_yields_empty_map() {
        let (data, body) = parse_frontmatter("# Just markdown\n").unwrap();
        assert!(data.is_empty());
        assert_eq!(body, "# Just markdown\n");
    }

    #[test]
    fn test_unclosed_frontmatter_is_error() {
        assert!(parse_frontmatter("---\ntitle: x\n").is_err());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(parse_frontmatter("---\ntitle: [unclosed\n---\nbody").is_err());
    }

    #[test]
    fn test_scalar_tags() {
        let post = Post::from_source(Path::new("a.md"), "a.md", "---\ntags: solo\n---\n").unwrap();
        assert_eq!(post.tags(), vec!["solo"]);
    }

    #[test]
    fn test_slug_for_nested_paths() {
        assert_eq!(slug_for("guides/focus.mdx"), "guides/focus");
        assert_eq!(slug_for("a.MD"), "a");
        assert_eq!(slug_for("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_parse_date_shapes() {
        assert!(parse_date("2024-01-05").is_some());
        assert!(parse_date("2024-01-05T12:00:00.000Z").is_some());
        assert!(parse_date("2024-01-05T12:00:00").is_some());
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_list_content_files_skips_dotfiles() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join(".drafts")).unwrap();
        std::fs::write(root.join("a.md"), "x").unwrap();
        std::fs::write(root.join(".hidden.md"), "x").unwrap();
        std::fs::write(root.join(".drafts/b.md"), "x").unwrap();
        std::fs::write(root.join("c.mdx"), "x").unwrap();
        std::fs::write(root.join("d.txt"), "x").unwrap();

        let cfg = ContentConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".into(), "**/*.mdx".into()],
            exclude_globs: vec![],
        };
        let rels: Vec<String> = list_content_files(&cfg)
            .unwrap()
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        assert_eq!(rels, vec!["a.md", "c.mdx"]);
    }
}
