//! In-memory [`SearchIndex`] for tests and headless use.
//!
//! Matching is a case-insensitive substring test against title and
//! excerpt. Records are returned in insertion order. Per-query delays,
//! a per-record resolution delay, and forced failures let tests drive the
//! controller through slow, failing, and out-of-order searches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{IndexError, IndexSource, RankingOptions, ResultRecord, SearchHit, SearchIndex};

pub struct MemoryIndex {
    records: Vec<ResultRecord>,
    ranking: Mutex<Option<RankingOptions>>,
    queries: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    data_delay: Mutex<Option<Duration>>,
    data_calls: AtomicUsize,
    fail_searches: AtomicBool,
    fail_data: AtomicBool,
}

impl MemoryIndex {
    pub fn new(records: Vec<ResultRecord>) -> Self {
        Self {
            records,
            ranking: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            data_delay: Mutex::new(None),
            data_calls: AtomicUsize::new(0),
            fail_searches: AtomicBool::new(false),
            fail_data: AtomicBool::new(false),
        }
    }

    /// Delays searches for exactly `query` by `delay`.
    pub fn delay_query(&self, query: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }

    /// Delays every record resolution by `delay`.
    pub fn delay_data(&self, delay: Duration) {
        *self.data_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_data(&self, fail: bool) {
        self.fail_data.store(fail, Ordering::SeqCst);
    }

    /// Queries issued so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Option<RankingOptions> {
        *self.ranking.lock().unwrap()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn configure(&self, ranking: &RankingOptions) -> Result<(), IndexError> {
        *self.ranking.lock().unwrap() = Some(*ranking);
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IndexError> {
        self.queries.lock().unwrap().push(query.to_string());

        let delay = self.delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(IndexError::Search("memory index failure".to_string()));
        }

        let needle = query.to_lowercase();
        Ok(self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.title.to_lowercase().contains(&needle)
                    || r.excerpt.to_lowercase().contains(&needle)
            })
            .map(|(i, _)| SearchHit {
                id: i.to_string(),
                score: 1.0,
                terms: vec![needle.clone()],
            })
            .collect())
    }

    async fn data(&self, hit: &SearchHit) -> Result<ResultRecord, IndexError> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.data_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_data.load(Ordering::SeqCst) {
            return Err(IndexError::Search(format!("no data for hit {}", hit.id)));
        }
        hit.id
            .parse::<usize>()
            .ok()
            .and_then(|i| self.records.get(i))
            .cloned()
            .ok_or_else(|| IndexError::Search(format!("unknown hit {}", hit.id)))
    }
}

/// [`IndexSource`] that hands out a shared [`MemoryIndex`], or reports the
/// asset as missing while unavailable.
pub struct MemorySource {
    index: Arc<MemoryIndex>,
    available: AtomicBool,
    opens: AtomicUsize,
}

impl MemorySource {
    pub fn new(index: Arc<MemoryIndex>) -> Self {
        Self {
            index,
            available: AtomicBool::new(true),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn missing(index: Arc<MemoryIndex>) -> Self {
        let source = Self::new(index);
        source.available.store(false, Ordering::SeqCst);
        source
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexSource for MemorySource {
    async fn open(&self) -> Result<Arc<dyn SearchIndex>, IndexError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(IndexError::AssetMissing {
                path: "memory://search-index".into(),
            });
        }
        let index: Arc<dyn SearchIndex> = self.index.clone();
        Ok(index)
    }
}
