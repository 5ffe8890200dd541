//! [`SearchIndex`] backed by the JSON asset written by `site index build`.
//!
//! Ranking is BM25-shaped. Every query term must match (the last term
//! also matches as a prefix, so partially typed words find results).
//! The two [`RankingOptions`] weights map onto the formula as follows:
//!
//! - `page_length` is the length-normalisation factor `b`: 0 ignores
//!   document length, 1 fully normalises by it.
//! - `term_frequency` blends saturated term frequency with plain presence:
//!   0 scores a term the same whether it appears once or fifty times.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{IndexError, IndexSource, RankingOptions, ResultRecord, SearchHit, SearchIndex};
use crate::search_index::IndexDocument;

const K1: f64 = 1.2;
const EXCERPT_WORDS: usize = 30;

struct Entry {
    doc: IndexDocument,
    term_counts: HashMap<String, u32>,
    len: usize,
}

pub struct StaticIndex {
    entries: Vec<Entry>,
    avg_len: f64,
    ranking: RwLock<RankingOptions>,
}

/// Lowercased alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl StaticIndex {
    pub fn new(docs: Vec<IndexDocument>) -> Self {
        let entries: Vec<Entry> = docs
            .into_iter()
            .map(|doc| {
                let tokens = tokenize(&format!(
                    "{} {} {} {}",
                    doc.title,
                    doc.description,
                    doc.content,
                    doc.tags.join(" ")
                ));
                let mut term_counts = HashMap::new();
                for t in &tokens {
                    *term_counts.entry(t.clone()).or_insert(0) += 1;
                }
                Entry {
                    doc,
                    term_counts,
                    len: tokens.len(),
                }
            })
            .collect();

        let avg_len = if entries.is_empty() {
            0.0
        } else {
            entries.iter().map(|e| e.len as f64).sum::<f64>() / entries.len() as f64
        };

        Self {
            entries,
            avg_len,
            ranking: RwLock::new(RankingOptions::default()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, IndexError> {
        let docs: Vec<IndexDocument> =
            serde_json::from_str(json).map_err(|e| IndexError::Load(e.to_string()))?;
        Ok(Self::new(docs))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Term frequency of `term` in `entry`, counting prefix matches when
    /// `prefix` is set.
    fn term_count(entry: &Entry, term: &str, prefix: bool) -> u32 {
        if prefix {
            entry
                .term_counts
                .iter()
                .filter(|(t, _)| t.starts_with(term))
                .map(|(_, c)| *c)
                .sum()
        } else {
            entry.term_counts.get(term).copied().unwrap_or(0)
        }
    }

    fn rank(&self, terms: &[String]) -> Vec<(usize, f64)> {
        let ranking = *self.ranking.read().unwrap_or_else(|e| e.into_inner());
        let n = self.entries.len() as f64;
        let b = ranking.page_length;
        let w = ranking.term_frequency;
        let last = terms.len().saturating_sub(1);

        // Document frequency per term
        let dfs: Vec<f64> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| {
                self.entries
                    .iter()
                    .filter(|e| Self::term_count(e, term, i == last) > 0)
                    .count() as f64
            })
            .collect();

        let mut scored = Vec::new();
        'docs: for (idx, entry) in self.entries.iter().enumerate() {
            let mut score = 0.0;
            for (i, term) in terms.iter().enumerate() {
                let tf = Self::term_count(entry, term, i == last) as f64;
                if tf == 0.0 {
                    continue 'docs;
                }
                let idf = ((n - dfs[i] + 0.5) / (dfs[i] + 0.5) + 1.0).ln();
                let len_norm = if self.avg_len > 0.0 {
                    1.0 - b + b * (entry.len as f64 / self.avg_len)
                } else {
                    1.0
                };
                let saturated = tf * (K1 + 1.0) / (tf + K1 * len_norm);
                let presence = (K1 + 1.0) / (1.0 + K1 * len_norm);
                score += idf * (w * saturated + (1.0 - w) * presence);
            }
            scored.push((idx, score));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.entries[a.0].doc.slug.cmp(&self.entries[b.0].doc.slug))
        });
        scored
    }
}

/// Builds a ~30 word excerpt around the first matching word, with matches
/// wrapped in `<mark>`. Words are HTML-escaped.
pub fn build_excerpt(content: &str, terms: &[String]) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let last = terms.len().saturating_sub(1);
    let is_match = |word: &str| {
        tokenize(word).iter().any(|tok| {
            terms
                .iter()
                .enumerate()
                .any(|(i, term)| tok == term || (i == last && tok.starts_with(term.as_str())))
        })
    };

    let first = words.iter().position(|w| is_match(w)).unwrap_or(0);
    let start = first
        .saturating_sub(EXCERPT_WORDS / 3)
        .min(words.len().saturating_sub(EXCERPT_WORDS));
    let end = (start + EXCERPT_WORDS).min(words.len());

    words[start..end]
        .iter()
        .map(|w| {
            let escaped = html_escape::encode_text(w);
            if is_match(w) {
                format!("<mark>{}</mark>", escaped)
            } else {
                escaped.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SearchIndex for StaticIndex {
    async fn configure(&self, ranking: &RankingOptions) -> Result<(), IndexError> {
        let mut current = self.ranking.write().unwrap_or_else(|e| e.into_inner());
        *current = *ranking;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, IndexError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .rank(&terms)
            .into_iter()
            .map(|(idx, score)| SearchHit {
                id: idx.to_string(),
                score,
                terms: terms.clone(),
            })
            .collect())
    }

    async fn data(&self, hit: &SearchHit) -> Result<ResultRecord, IndexError> {
        let entry = hit
            .id
            .parse::<usize>()
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or_else(|| IndexError::Search(format!("unknown hit id {}", hit.id)))?;
        let doc = &entry.doc;

        Ok(ResultRecord {
            url: doc.url.clone(),
            title: doc.title.clone(),
            excerpt: build_excerpt(&doc.content, &hit.terms),
            tags: if doc.tags.is_empty() {
                None
            } else {
                Some(doc.tags.join(", "))
            },
            date: doc.pub_date.clone(),
            word_count: doc.word_count,
        })
    }
}

/// Opens the index asset from a fixed path on disk.
pub struct StaticIndexSource {
    path: PathBuf,
}

impl StaticIndexSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IndexSource for StaticIndexSource {
    async fn open(&self) -> Result<Arc<dyn SearchIndex>, IndexError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::AssetMissing {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(IndexError::Load(e.to_string())),
        };
        let index: Arc<dyn SearchIndex> = Arc::new(StaticIndex::from_json(&json)?);
        Ok(index)
    }
}
