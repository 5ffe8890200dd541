//! Search index capability.
//!
//! The search modal never talks to a concrete index. It asks an
//! [`IndexLoader`] for a handle implementing [`SearchIndex`], which is
//! obtained lazily from an [`IndexSource`] the first time a query runs and
//! then reused for the lifetime of the loader.
//!
//! | Type | Role |
//! |------|------|
//! | [`SearchIndex`] | configure ranking, run a query, resolve a hit's record |
//! | [`IndexSource`] | opens a fresh index handle (file, memory, ...) |
//! | [`IndexLoader`] | memoizes the first successfully opened handle |
//! | [`static_index::StaticIndexSource`] | JSON asset on disk |
//! | [`memory::MemoryIndex`] | fixed in-memory index for tests |

pub mod memory;
pub mod static_index;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Ranking weights applied once per load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingOptions {
    /// How strongly long pages are penalised (0 = not at all, 1 = fully).
    pub page_length: f64,
    /// How much repeated occurrences of a term count (0 = presence only).
    pub term_frequency: f64,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            page_length: 0.5,
            term_frequency: 1.0,
        }
    }
}

/// A ranked match returned by [`SearchIndex::search`].
///
/// Carries only an identifier; the full record is fetched separately via
/// [`SearchIndex::data`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    /// Normalized query terms, used to highlight the excerpt.
    pub terms: Vec<String>,
}

/// Display record for a single hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub url: String,
    pub title: String,
    /// HTML snippet with matched terms wrapped in `<mark>`. Semi-trusted.
    pub excerpt: String,
    /// Comma-joined tag list.
    pub tags: Option<String>,
    pub date: Option<String>,
    pub word_count: usize,
}

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("search index asset missing at {}", path.display())]
    AssetMissing { path: PathBuf },
    #[error("failed to load search index: {0}")]
    Load(String),
    #[error("search failed: {0}")]
    Search(String),
}

impl IndexError {
    pub fn is_asset_missing(&self) -> bool {
        matches!(self, IndexError::AssetMissing { .. })
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Applies ranking weights to subsequent searches.
    async fn configure(&self, ranking: &RankingOptions) -> Result<(), IndexError>;

    /// Returns hits ordered best first.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IndexError>;

    /// Resolves the display record for a hit.
    async fn data(&self, hit: &SearchHit) -> Result<ResultRecord, IndexError>;
}

#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Opens a new index handle. Called at most once per successful load.
    async fn open(&self) -> Result<Arc<dyn SearchIndex>, IndexError>;
}

/// Lazily opens and caches a [`SearchIndex`].
///
/// A failed open is not cached: the next [`load`](IndexLoader::load)
/// tries again, so building the index while the modal is alive works
/// without a restart.
pub struct IndexLoader {
    source: Arc<dyn IndexSource>,
    ranking: RankingOptions,
    handle: OnceCell<Arc<dyn SearchIndex>>,
}

impl IndexLoader {
    pub fn new(source: Arc<dyn IndexSource>, ranking: RankingOptions) -> Self {
        Self {
            source,
            ranking,
            handle: OnceCell::new(),
        }
    }

    pub async fn load(&self) -> Result<Arc<dyn SearchIndex>, IndexError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let index = self.source.open().await.inspect_err(|e| {
                    if e.is_asset_missing() {
                        tracing::warn!(
                            error = %e,
                            "search index not found; run `site index build` or build the site to generate it"
                        );
                    } else {
                        tracing::warn!(error = %e, "failed to open search index");
                    }
                })?;
                index.configure(&self.ranking).await?;
                Ok::<_, IndexError>(index)
            })
            .await?;
        Ok(handle.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }

    /// Loads the index, runs `query`, and resolves the records of the first
    /// `limit` hits concurrently. Fails as a whole if any record fails.
    pub async fn query(&self, query: &str, limit: usize) -> Result<Vec<ResultRecord>, IndexError> {
        let index = self.load().await?;
        let hits = index.search(query).await?;
        try_join_all(hits.iter().take(limit).map(|hit| index.data(hit))).await
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryIndex, MemorySource};
    use super::*;
    use std::time::Duration;

    fn record(title: &str) -> ResultRecord {
        ResultRecord {
            url: format!("/{}/", title.to_lowercase()),
            title: title.to_string(),
            excerpt: String::new(),
            tags: None,
            date: None,
            word_count: 10,
        }
    }

    #[tokio::test]
    async fn test_loader_memoizes_handle() {
        let index = Arc::new(MemoryIndex::new(vec![record("Alpha")]));
        let source = Arc::new(MemorySource::new(index.clone()));
        let loader = IndexLoader::new(source.clone(), RankingOptions::default());

        let a = loader.load().await.unwrap();
        let b = loader.load().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.open_calls(), 1);
        assert_eq!(index.configured(), Some(RankingOptions::default()));
    }

    #[tokio::test]
    async fn test_missing_asset_is_distinct_and_retried() {
        let index = Arc::new(MemoryIndex::new(vec![record("Alpha")]));
        let source = Arc::new(MemorySource::missing(index));
        let loader = IndexLoader::new(source.clone(), RankingOptions::default());

        let err = loader.load().await.err().unwrap();
        assert!(err.is_asset_missing());
        assert!(!loader.is_loaded());

        source.set_available(true);
        assert!(loader.load().await.is_ok());
        assert_eq!(source.open_calls(), 2);
    }

    #[tokio::test]
    async fn test_query_caps_resolved_records() {
        let records = (0..5).map(|i| record(&format!("Deep {}", i))).collect();
        let index = Arc::new(MemoryIndex::new(records));
        let loader = IndexLoader::new(
            Arc::new(MemorySource::new(index.clone())),
            RankingOptions::default(),
        );

        let found = loader.query("deep", 3).await.unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].title, "Deep 0");
        assert_eq!(index.data_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_resolves_records_concurrently() {
        let records = (0..3).map(|i| record(&format!("Deep {}", i))).collect();
        let index = Arc::new(MemoryIndex::new(records));
        index.delay_data(Duration::from_millis(100));
        let loader = IndexLoader::new(
            Arc::new(MemorySource::new(index.clone())),
            RankingOptions::default(),
        );

        let started = tokio::time::Instant::now();
        let found = loader.query("deep", 10).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(found.len(), 3);
        assert_eq!(index.data_calls(), 3);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200), "resolved serially: {:?}", elapsed);
    }

    #[test]
    fn test_default_ranking_weights() {
        let r = RankingOptions::default();
        assert!((r.page_length - 0.5).abs() < f64::EPSILON);
        assert!((r.term_frequency - 1.0).abs() < f64::EPSILON);
    }
}
