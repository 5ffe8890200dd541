//! Internal link maintenance.
//!
//! `site links rewrite` rewrites legacy `/blog/<slug>` links in post bodies
//! to root-relative `/<slug>` links. Only Markdown links are touched. Tag
//! archive links (`/blog/tag/...`) still live under `/blog` and are left
//! alone.
//!
//! `site links check` reads the built homepage, from `dist/` or a running
//! server, and confirms that every root-level post link it carries
//! resolves.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use reqwest::{Method, StatusCode, Url};

use crate::config::{ContentConfig, SiteConfig};
use crate::content;

static BLOG_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(/blog/([^)]+)\)").unwrap());

static ANCHOR_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\b[^>]*href\s*=\s*"([^"]+)""#).unwrap());

/// Root-level pages that are not posts.
const STATIC_PAGES: &[&str] = &[
    "/",
    "/now",
    "/newsletter",
    "/blog",
    "/rss.xml",
    "/sitemap.xml",
    "/robots.txt",
];

/// Returns the rewritten text and the number of links changed.
pub fn rewrite_internal_links(text: &str) -> (Cow<'_, str>, usize) {
    let mut count = 0;
    let rewritten = BLOG_LINK.replace_all(text, |caps: &Captures| {
        let label = &caps[1];
        let target = &caps[2];
        if target.starts_with("tag/") {
            caps[0].to_string()
        } else {
            count += 1;
            format!("[{}](/{})", label, target)
        }
    });
    (rewritten, count)
}

/// `site links rewrite`: rewrites every content file in place, or only
/// reports what would change when `dry_run` is set.
pub fn run_links_rewrite(config: &ContentConfig, dry_run: bool) -> Result<()> {
    let mut files_changed = 0;
    let mut links_changed = 0;

    for (path, rel) in content::list_content_files(config)? {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (rewritten, count) = rewrite_internal_links(&source);
        if count == 0 {
            continue;
        }

        if dry_run {
            println!("Would update: {} ({} link{})", rel, count, plural(count));
        } else {
            std::fs::write(&path, rewritten.as_ref())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Updated: {} ({} link{})", rel, count, plural(count));
        }
        files_changed += 1;
        links_changed += count;
    }

    println!();
    println!(
        "{} {} file{} ({} link{})",
        if dry_run { "Would update" } else { "✅ Updated" },
        files_changed,
        plural(files_changed),
        links_changed,
        plural(links_changed)
    );
    Ok(())
}

/// Collects same-site post links (`/<slug>`) from homepage markup, in
/// order of first appearance. A trailing slash is dropped.
pub fn extract_post_links(html: &str, site_url: &str) -> Vec<String> {
    let site_host = Url::parse(site_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for caps in ANCHOR_HREF.captures_iter(html) {
        let href = &caps[1];
        if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("tel:") {
            continue;
        }

        let path = if href.starts_with("http://") || href.starts_with("https://") {
            let Ok(url) = Url::parse(href) else {
                continue;
            };
            let host = url.host_str().map(|h| h.trim_start_matches("www."));
            if host != site_host.as_deref() {
                continue;
            }
            url.path().to_string()
        } else {
            href.to_string()
        };

        let path = path.split(['?', '#']).next().unwrap_or_default();
        if STATIC_PAGES.contains(&path) || path.starts_with("/tag/") {
            continue;
        }
        let trimmed = path.trim_end_matches('/');
        let Some(slug) = trimmed.strip_prefix('/') else {
            continue;
        };
        if slug.is_empty() || slug.contains('/') || STATIC_PAGES.contains(&trimmed) {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            links.push(trimmed.to_string());
        }
    }
    links
}

/// Outcome of resolving one homepage link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub url: String,
    pub status: Option<u16>,
    pub note: Option<String>,
}

impl LinkStatus {
    pub fn is_ok(&self) -> bool {
        self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "[200] {}", self.url);
        }
        write!(f, "[ERROR] {}", self.url)?;
        match (&self.status, &self.note) {
            (Some(status), _) => write!(f, " ({})", status),
            (None, Some(note)) => write!(f, " ({})", note),
            (None, None) => Ok(()),
        }
    }
}

/// Homepage locations tried under `dist`, with the directory their links
/// resolve against.
fn homepage_candidates(dist: &Path) -> [(PathBuf, PathBuf); 3] {
    let client = dist.join("client");
    [
        (dist.join("index.html"), dist.to_path_buf()),
        (client.join("index.html"), client.clone()),
        (client.join("home").join("index.html"), client),
    ]
}

/// Checks the homepage links of a built site against its output files.
/// `/<slug>` resolves to `<slug>/index.html` or `<slug>.html`.
pub fn check_dist(dist: &Path, site_url: &str) -> Result<Vec<LinkStatus>> {
    let Some((home, root)) = homepage_candidates(dist)
        .into_iter()
        .find(|(home, _)| home.is_file())
    else {
        bail!(
            "No built homepage found in {}. Build the site first.",
            dist.display()
        );
    };
    let html = std::fs::read_to_string(&home)
        .with_context(|| format!("Failed to read {}", home.display()))?;

    Ok(extract_post_links(&html, site_url)
        .into_iter()
        .map(|url| {
            let rel = url.trim_start_matches('/');
            let found = root.join(rel).join("index.html").is_file()
                || root.join(format!("{}.html", rel)).is_file();
            LinkStatus {
                url,
                status: found.then_some(200),
                note: (!found).then(|| "file not found".to_string()),
            }
        })
        .collect())
}

/// Fetches the homepage from a running server at `base` and requests each
/// post link it carries. Servers that refuse `HEAD` are retried with `GET`.
pub async fn check_base(base: &str, site_url: &str) -> Result<Vec<LinkStatus>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let base = base.trim_end_matches('/');
    let home = format!("{}/", base);

    let html = http
        .get(&home)
        .send()
        .await
        .with_context(|| format!("Failed to fetch homepage {}", home))?
        .text()
        .await
        .with_context(|| format!("Failed to read homepage {}", home))?;

    let mut results = Vec::new();
    for url in extract_post_links(&html, site_url) {
        let full = format!("{}{}", base, url);
        let status = match request_status(&http, Method::HEAD, &full).await {
            Ok(StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED) => {
                request_status(&http, Method::GET, &full).await
            }
            other => other,
        };
        results.push(match status {
            Ok(status) => LinkStatus {
                url,
                status: Some(status.as_u16()),
                note: None,
            },
            Err(e) => LinkStatus {
                url,
                status: None,
                note: Some(e.to_string()),
            },
        });
    }
    Ok(results)
}

async fn request_status(
    http: &reqwest::Client,
    method: Method,
    url: &str,
) -> reqwest::Result<StatusCode> {
    Ok(http.request(method, url).send().await?.status())
}

/// `site links check`: prints one line per homepage link and a summary.
/// Returns whether every link resolved.
pub async fn run_links_check(site: &SiteConfig, base: Option<&str>, dist: &Path) -> Result<bool> {
    let results = match base {
        Some(base) => check_base(base, &site.url).await?,
        None => check_dist(dist, &site.url)?,
    };

    for result in &results {
        println!("{}", result);
    }
    let bad = results.iter().filter(|r| !r.is_ok()).count();
    println!();
    println!("Summary: OK={} ERROR={}", results.len() - bad, bad);
    Ok(bad == 0)
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rewrites_post_links() {
        let (out, count) =
            rewrite_internal_links("See [this](/blog/deep-work) and [that](/blog/the-post).");
        assert_eq!(out, "See [this](/deep-work) and [that](/the-post).");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_leaves_tag_links_alone() {
        let text = "Browse [focus](/blog/tag/focus) or [t](/blog/tagging-101).";
        let (out, count) = rewrite_internal_links(text);
        assert_eq!(out, "Browse [focus](/blog/tag/focus) or [t](/tagging-101).");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_ignores_non_link_mentions() {
        let text = "The old /blog/deep-work path and [ext](https://x.y/blog/a).";
        let (out, count) = rewrite_internal_links(text);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(count, 0);
    }

    const HOME: &str = r##"
        <nav><a href="/">Home</a><a href="/now">Now</a><a href="/tag/focus">Focus</a></nav>
        <a class="card" href="/deep-work">Deep Work</a>
        <a href="https://www.example.com/better-sleep/?ref=home">Sleep</a>
        <A HREF="/deep-work#top">again</A>
        <a href="/blog/old-post">legacy</a>
        <a href="https://other.example/elsewhere">ext</a>
        <a href="mailto:hi@example.com">mail</a>
        <a href="/posts/nested">nested</a>
    "##;

    #[test]
    fn test_extracts_same_site_post_links() {
        let links = extract_post_links(HOME, "https://example.com");
        assert_eq!(links, vec!["/deep-work", "/better-sleep"]);
    }

    #[test]
    fn test_check_dist_resolves_both_layouts() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path();
        std::fs::write(dist.join("index.html"), HOME).unwrap();
        std::fs::create_dir_all(dist.join("deep-work")).unwrap();
        std::fs::write(dist.join("deep-work/index.html"), "ok").unwrap();

        let results = check_dist(dist, "https://example.com").unwrap();
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert_eq!(results[1].to_string(), "[ERROR] /better-sleep (file not found)");

        std::fs::write(dist.join("better-sleep.html"), "ok").unwrap();
        let results = check_dist(dist, "https://example.com").unwrap();
        assert!(results.iter().all(LinkStatus::is_ok));
    }

    #[test]
    fn test_check_dist_uses_client_homepage() {
        let tmp = TempDir::new().unwrap();
        let client = tmp.path().join("client");
        std::fs::create_dir_all(client.join("home")).unwrap();
        std::fs::write(client.join("home/index.html"), r#"<a href="/deep-work">x</a>"#).unwrap();
        std::fs::write(client.join("deep-work.html"), "ok").unwrap();

        let results = check_dist(tmp.path(), "https://example.com").unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_check_dist_without_homepage_fails() {
        let tmp = TempDir::new().unwrap();
        let err = check_dist(tmp.path(), "https://example.com").unwrap_err();
        assert!(err.to_string().contains("No built homepage found"));
    }

    #[tokio::test]
    async fn test_check_base_against_running_server() {
        use axum::http::Method as AxumMethod;
        use axum::http::StatusCode as AxumStatus;
        use axum::response::Html;
        use axum::routing::{any, get};
        use axum::Router;

        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    Html(r#"<a href="/deep-work">a</a><a href="/gone">b</a><a href="/head-shy">c</a>"#)
                }),
            )
            .route("/deep-work", get(|| async { "ok" }))
            .route(
                "/head-shy",
                any(|method: AxumMethod| async move {
                    if method == AxumMethod::HEAD {
                        AxumStatus::METHOD_NOT_ALLOWED
                    } else {
                        AxumStatus::OK
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = format!("http://{}/", addr);
        let results = check_base(&base, "https://example.com").await.unwrap();
        let lines: Vec<String> = results.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            lines,
            vec!["[200] /deep-work", "[ERROR] /gone (404)", "[200] /head-shy"]
        );
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("post.mdx");
        let body = "---\ntitle: T\n---\n[a](/blog/other-post)\n";
        std::fs::write(&file, body).unwrap();
        let config = ContentConfig {
            root: tmp.path().to_path_buf(),
            include_globs: vec!["**/*.mdx".to_string()],
            exclude_globs: Vec::new(),
        };

        run_links_rewrite(&config, true).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), body);

        run_links_rewrite(&config, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "---\ntitle: T\n---\n[a](/other-post)\n"
        );
    }
}
