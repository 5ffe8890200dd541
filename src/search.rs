//! `site search`: runs a query through the same modal controller the site
//! uses, against the built index asset, and prints the rendered results.

use std::sync::{Arc, LazyLock};

use anyhow::{anyhow, bail, Result};
use regex::Regex;

use crate::config::Config;
use crate::index::static_index::StaticIndexSource;
use crate::index::{IndexLoader, RankingOptions};
use crate::modal::{ModalEvent, ModalOptions, SearchModal};
use crate::render::{ResultCard, ResultsPane, NO_RESULTS_TEXT};
use crate::view::MemoryDom;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

pub fn ranking_options(config: &Config) -> RankingOptions {
    RankingOptions {
        page_length: config.search.page_length,
        term_frequency: config.search.term_frequency,
    }
}

pub fn index_loader(config: &Config) -> IndexLoader {
    let source = StaticIndexSource::new(&config.search.index_path);
    IndexLoader::new(Arc::new(source), ranking_options(config))
}

/// Runs `query` without the debounce and returns what the results
/// container would show.
pub async fn search_pane(config: &Config, query: &str) -> Result<ResultsPane> {
    let modal = SearchModal::new(
        MemoryDom::with_search_anchors(),
        index_loader(config),
        ModalOptions::from(&config.search),
    )
    .map_err(|e| anyhow!(e))?;

    modal.dispatch(ModalEvent::TriggerClick);
    modal.search_now(query).await;
    let pane = modal.pane();
    modal.destroy();
    Ok(pane)
}

/// Excerpt markup reduced to plain text for the terminal.
pub fn excerpt_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, "");
    html_escape::decode_html_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_card(card: &ResultCard) {
    println!("{}. {}", card.index + 1, card.title);
    println!("    url: {}", card.href);
    if let Some(date) = &card.date {
        println!("    date: {}", date);
    }
    if !card.tags.is_empty() {
        println!("    tags: {}", card.tags.join(", "));
    }
    if let Some(excerpt) = &card.excerpt_html {
        println!("    excerpt: \"{}\"", excerpt_text(excerpt));
    }
    println!();
}

pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    match search_pane(config, query).await? {
        ResultsPane::Hint => {
            println!(
                "Query must be at least {} characters.",
                config.search.min_query_len
            );
        }
        ResultsPane::NoResults => println!("{}", NO_RESULTS_TEXT),
        ResultsPane::Error(message) => bail!(message),
        ResultsPane::Results(cards) => {
            for card in &cards {
                print_card(card);
            }
        }
    }
    Ok(())
}
