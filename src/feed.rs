//! RSS 2.0 feed of published posts.
//!
//! Items are newest first. Links use the root URL structure
//! (`<site>/<slug>/`) while GUIDs keep the legacy `/blog/<slug>/` form so
//! feed readers that already saw a post do not list it again.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::config::{Config, SiteConfig};
use crate::content::{self, Post};

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub author: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub title: String,
    pub description: String,
    pub site: String,
    pub language: String,
    pub items: Vec<FeedItem>,
}

impl Feed {
    /// Builds the feed from already-filtered posts. Drafts and posts
    /// without a title or date are skipped; items are sorted newest first.
    pub fn from_posts(site: &SiteConfig, posts: &[Post]) -> Self {
        let base = site.url.trim_end_matches('/');
        let mut items: Vec<FeedItem> = posts
            .iter()
            .filter(|p| !p.is_draft())
            .filter_map(|post| {
                Some(FeedItem {
                    title: post.title()?.to_string(),
                    pub_date: post.pub_date()?,
                    link: format!("{}/{}/", base, post.slug),
                    guid: format!("{}/blog/{}/", base, post.slug),
                    description: post.description().unwrap_or_default().to_string(),
                    author: post.author(),
                    categories: post.visible_tags(),
                })
            })
            .collect();
        items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

        Self {
            title: site.title.clone(),
            description: site.description.clone(),
            site: format!("{}/", base),
            language: site.language.clone(),
            items,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("rss").with_attributes([("version", "2.0")]),
        ))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        text_element(&mut writer, "title", &self.title)?;
        text_element(&mut writer, "description", &self.description)?;
        text_element(&mut writer, "link", &self.site)?;
        text_element(&mut writer, "language", &self.language)?;

        for item in &self.items {
            writer.write_event(Event::Start(BytesStart::new("item")))?;
            text_element(&mut writer, "title", &item.title)?;
            text_element(&mut writer, "link", &item.link)?;
            writer.write_event(Event::Start(
                BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
            ))?;
            writer.write_event(Event::Text(BytesText::new(&item.guid)))?;
            writer.write_event(Event::End(BytesEnd::new("guid")))?;
            if !item.description.is_empty() {
                text_element(&mut writer, "description", &item.description)?;
            }
            text_element(&mut writer, "pubDate", &item.pub_date.to_rfc2822())?;
            text_element(&mut writer, "author", &item.author)?;
            for category in &item.categories {
                text_element(&mut writer, "category", category)?;
            }
            writer.write_event(Event::End(BytesEnd::new("item")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;

        String::from_utf8(writer.into_inner()).context("feed is not valid UTF-8")
    }
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

pub fn build_feed(config: &Config) -> Result<String> {
    let posts = content::published_posts(&config.content)?;
    Feed::from_posts(&config.site, &posts).to_xml()
}

/// `site feed`: writes the feed to `output`, or stdout.
pub fn run_feed(config: &Config, output: Option<&Path>) -> Result<()> {
    let xml = build_feed(config)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, xml)
                .with_context(|| format!("Failed to write feed to {}", path.display()))?;
            eprintln!("Feed written → {}", path.display());
        }
        None => println!("{}", xml),
    }
    Ok(())
}
