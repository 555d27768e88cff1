//! TF-IDF passage index with cosine ranking.
//!
//! The index is an immutable snapshot behind an `Arc`. Re-indexing builds a
//! new snapshot and swaps the pointer, so concurrent searches always see one
//! complete version of the corpus.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retrieval::document::{snippet, tokenize, Document};

/// One ranked passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub id: String,
    /// Cosine similarity in `[0, 1]`.
    pub score: f64,
    pub text: String,
}

impl ScoredPassage {
    pub fn snippet(&self) -> String {
        snippet(&self.text)
    }
}

/// Passages ranked by descending score, ties by ascending id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<ScoredPassage>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn top_score(&self) -> f64 {
        self.passages.first().map_or(0.0, |p| p.score)
    }

    pub fn doc_ids(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.id.as_str()).collect()
    }
}

#[derive(Debug)]
struct IndexedDoc {
    id: String,
    text: String,
    /// L2-normalised tf-idf weights.
    weights: BTreeMap<String, f64>,
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    docs: Vec<IndexedDoc>,
    idf: BTreeMap<String, f64>,
}

impl IndexSnapshot {
    fn build(documents: Vec<Document>) -> Self {
        let n = documents.len() as f64;
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in &documents {
            for term in doc.term_freqs.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let idf: BTreeMap<String, f64> = df
            .into_iter()
            .map(|(term, count)| {
                let weight = ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0;
                (term, weight)
            })
            .collect();

        let docs = documents
            .into_iter()
            .map(|doc| {
                let raw: BTreeMap<String, f64> = doc
                    .term_freqs
                    .iter()
                    .map(|(term, &tf)| (term.clone(), sublinear(tf) * idf.get(term).copied().unwrap_or(0.0)))
                    .collect();
                IndexedDoc { id: doc.id, text: doc.text, weights: normalize(raw) }
            })
            .collect();

        Self { docs, idf }
    }

    fn search(&self, query: &str, k: usize) -> RetrievalResult {
        if k == 0 || self.docs.is_empty() {
            return RetrievalResult::default();
        }

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for token in tokenize(query) {
            if self.idf.contains_key(&token) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        let query_weights = normalize(
            counts
                .into_iter()
                .map(|(term, tf)| {
                    let w = sublinear(tf) * self.idf.get(&term).copied().unwrap_or(0.0);
                    (term, w)
                })
                .collect(),
        );
        if query_weights.is_empty() {
            return RetrievalResult::default();
        }

        let mut scored: Vec<(&IndexedDoc, f64)> = self
            .docs
            .iter()
            .map(|doc| {
                let dot: f64 = query_weights
                    .iter()
                    .filter_map(|(term, qw)| doc.weights.get(term).map(|dw| qw * dw))
                    .sum();
                (doc, dot.clamp(0.0, 1.0))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        scored.truncate(k);

        RetrievalResult {
            passages: scored
                .into_iter()
                .map(|(doc, score)| ScoredPassage { id: doc.id.clone(), score, text: doc.text.clone() })
                .collect(),
        }
    }
}

fn sublinear(tf: u32) -> f64 {
    if tf == 0 { 0.0 } else { 1.0 + f64::from(tf).ln() }
}

fn normalize(weights: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        return BTreeMap::new();
    }
    weights.into_iter().filter(|(_, w)| *w > 0.0).map(|(t, w)| (t, w / norm)).collect()
}

/// Thread-safe passage retriever.
#[derive(Debug, Default)]
pub struct Retriever {
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl Retriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        let retriever = Self::new();
        retriever.index(documents);
        retriever
    }

    /// Replaces the indexed corpus. Searches already running keep the old snapshot.
    pub fn index(&self, documents: Vec<Document>) {
        let snapshot = Arc::new(IndexSnapshot::build(documents));
        debug!(documents = snapshot.docs.len(), terms = snapshot.idf.len(), "Built passage index");
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }

    /// Top `k` passages for `query`. Passages sharing no term with the query are never returned.
    pub fn search(&self, query: &str, k: usize) -> RetrievalResult {
        let snapshot = Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner));
        snapshot.search(query, k)
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("product_policy::chunk0", "Returns: beverages unopened within 14 days; perishables 3 to 7 days."),
            Document::new("kpi_definitions::chunk0", "Average Order Value (AOV) = revenue divided by the number of distinct orders."),
            Document::new("kpi_definitions::chunk1", "Gross Margin = revenue minus cost of goods. Approximate cost as 70% of unit price."),
            Document::new("marketing_calendar::chunk0", "Summer Beverages 1997: 1997-06-01 to 1997-06-30."),
        ]
    }

    #[test]
    fn test_search_ranks_relevant_passage_first() {
        let retriever = Retriever::from_documents(corpus());
        let result = retriever.search("What is the return window for unopened beverages?", 3);
        assert_eq!(result.passages[0].id, "product_policy::chunk0");
        assert!(result.top_score() > 0.0 && result.top_score() <= 1.0);
        assert!(result.passages.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_unrelated_query_returns_nothing() {
        let retriever = Retriever::from_documents(corpus());
        assert!(retriever.search("zebra xylophone", 3).is_empty());
        assert!(retriever.search("", 3).is_empty());
        assert!(retriever.search("beverages", 0).is_empty());
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        let retriever = Retriever::new();
        assert!(retriever.is_empty());
        assert!(retriever.search("beverages", 5).is_empty());
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let retriever = Retriever::from_documents(vec![
            Document::new("b::chunk0", "seafood promotion"),
            Document::new("a::chunk0", "seafood promotion"),
        ]);
        let result = retriever.search("seafood", 2);
        assert_eq!(result.doc_ids(), vec!["a::chunk0", "b::chunk0"]);
        assert!((result.passages[0].score - result.passages[1].score).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_is_idempotent() {
        let retriever = Retriever::from_documents(corpus());
        let first = retriever.search("gross margin cost", 3);
        let second = retriever.search("gross margin cost", 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reindex_swaps_snapshot() {
        let retriever = Retriever::from_documents(corpus());
        retriever.index(vec![Document::new("new::chunk0", "only this passage about beverages")]);
        assert_eq!(retriever.len(), 1);
        assert_eq!(retriever.search("beverages", 3).doc_ids(), vec!["new::chunk0"]);
    }

    #[test]
    fn test_concurrent_search_during_reindex_sees_whole_snapshots() {
        let retriever = Arc::new(Retriever::from_documents(corpus()));
        let old = retriever.search("beverages", 5);
        let new_corpus = vec![Document::new("other::chunk0", "beverages only here")];
        let new = IndexSnapshot::build(new_corpus.clone()).search("beverages", 5);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let retriever = Arc::clone(&retriever);
                let (old, new) = (old.clone(), new.clone());
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let got = retriever.search("beverages", 5);
                        assert!(got == old || got == new);
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            retriever.index(new_corpus.clone());
            retriever.index(corpus());
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
