use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::{tokenize, RecordStore, ToolError};

/// TF-IDF search index over record bodies. Built lazily on first search and
/// rebuilt whenever the store generation has moved past the one the cached
/// build was taken from. Never persisted.
pub(crate) struct SemanticIndex {
    store: Arc<RecordStore>,
    built: Mutex<Option<IndexBuild>>,
}

struct IndexBuild {
    generation: u64,
    idf: HashMap<String, f64>,
    docs: Vec<DocVector>,
}

struct DocVector {
    id: String,
    body: String,
    weights: HashMap<String, f64>,
    norm: f64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SearchHit {
    pub(crate) id: String,
    pub(crate) score: f64,
    pub(crate) body: String,
}

pub(crate) const DEFAULT_TOP_K: usize = 10;

impl SemanticIndex {
    pub(crate) fn new(store: Arc<RecordStore>) -> Self {
        SemanticIndex {
            store,
            built: Mutex::new(None),
        }
    }

    /// Ranked search. Hits are ordered by score descending, ties broken by
    /// id ascending; zero-score hits are dropped, so a query with no terms
    /// in the vocabulary returns nothing.
    pub(crate) fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, ToolError> {
        let mut guard = self
            .built
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.store.generation();
        let needs_build = match guard.as_ref() {
            Some(build) => build.generation != current,
            None => true,
        };
        if needs_build {
            *guard = Some(build_index(&self.store, current)?);
        }
        let build = guard
            .as_ref()
            .ok_or_else(|| ToolError::IndexBuild("index unavailable after build".to_string()))?;

        let query_terms = tokenize(query);
        if query_terms.is_empty() || build.docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_tf: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            *query_tf.entry(term.as_str()).or_insert(0.0) += 1.0;
        }
        let mut query_weights: HashMap<&str, f64> = HashMap::new();
        for (term, tf) in query_tf {
            // Out-of-vocabulary terms carry no weight.
            if let Some(idf) = build.idf.get(term) {
                query_weights.insert(term, tf * idf);
            }
        }
        let query_norm = query_weights.values().map(|w| w * w).sum::<f64>().sqrt();
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = build
            .docs
            .iter()
            .filter_map(|doc| {
                let dot: f64 = query_weights
                    .iter()
                    .filter_map(|(term, qw)| doc.weights.get(*term).map(|dw| qw * dw))
                    .sum();
                if dot <= 0.0 || doc.norm == 0.0 {
                    return None;
                }
                Some(SearchHit {
                    id: doc.id.clone(),
                    score: dot / (query_norm * doc.norm),
                    body: doc.body.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn build_index(store: &RecordStore, generation: u64) -> Result<IndexBuild, ToolError> {
    let records = store
        .list_records()
        .map_err(|e| ToolError::IndexBuild(format!("corpus scan failed: {e}")))?;

    let mut doc_terms: Vec<(String, String, HashMap<String, f64>)> = Vec::new();
    let mut df: HashMap<String, usize> = HashMap::new();
    for record in records {
        let mut tf: HashMap<String, f64> = HashMap::new();
        for term in tokenize(&record.body) {
            *tf.entry(term).or_insert(0.0) += 1.0;
        }
        for term in tf.keys() {
            *df.entry(term.clone()).or_insert(0) += 1;
        }
        doc_terms.push((record.id, record.body, tf));
    }

    // Smoothed so terms present in every document still discriminate.
    let n = doc_terms.len() as f64;
    let idf: HashMap<String, f64> = df
        .into_iter()
        .map(|(term, count)| (term, ((n + 1.0) / (count as f64 + 1.0)).ln() + 1.0))
        .collect();

    let docs = doc_terms
        .into_iter()
        .map(|(id, body, tf)| {
            let weights: HashMap<String, f64> = tf
                .into_iter()
                .filter_map(|(term, count)| idf.get(&term).map(|w| (term, count * w)))
                .collect();
            let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
            DocVector {
                id,
                body,
                weights,
                norm,
            }
        })
        .collect();

    Ok(IndexBuild {
        generation,
        idf,
        docs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordPatch;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn temp_setup(name: &str) -> (PathBuf, Arc<RecordStore>, SemanticIndex) {
        let dir = std::env::temp_dir()
            .join("lorevault_test")
            .join(format!("index_{}_{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let store = Arc::new(RecordStore::open(&dir).unwrap());
        let index = SemanticIndex::new(store.clone());
        (dir, store, index)
    }

    fn add(store: &RecordStore, body: &str) -> String {
        store
            .create(body.to_string(), vec![], BTreeMap::new())
            .unwrap()
            .id
    }

    #[test]
    fn shared_and_distinct_terms_rank_as_expected() {
        let (_dir, store, index) = temp_setup("fox_dog");
        let fox = add(&store, "the quick brown fox");
        let dog = add(&store, "a slow brown dog");

        let brown = index.search("brown", 2).unwrap();
        let mut ids: Vec<&str> = brown.iter().map(|h| h.id.as_str()).collect();
        ids.sort();
        let mut expected = vec![fox.as_str(), dog.as_str()];
        expected.sort();
        assert_eq!(ids, expected);

        let quick = index.search("quick", 10).unwrap();
        assert_eq!(quick.len(), 1);
        assert_eq!(quick[0].id, fox);
    }

    #[test]
    fn results_are_deterministic() {
        let (_dir, store, index) = temp_setup("deterministic");
        add(&store, "alpha beta gamma");
        add(&store, "beta gamma delta");
        add(&store, "gamma delta epsilon");

        let first = index.search("beta gamma", 10).unwrap();
        let second = index.search("beta gamma", 10).unwrap();
        let ids1: Vec<&str> = first.iter().map(|h| h.id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids1, ids2);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn equal_scores_tie_break_by_id() {
        let (_dir, store, index) = temp_setup("tie_break");
        let a = add(&store, "identical text");
        let b = add(&store, "identical text");
        let hits = index.search("identical", 10).unwrap();
        assert_eq!(hits.len(), 2);
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(hits[0].id, expected[0]);
        assert_eq!(hits[1].id, expected[1]);
    }

    #[test]
    fn mutations_invalidate_the_cached_build() {
        let (_dir, store, index) = temp_setup("invalidation");
        let first = add(&store, "solar panels");
        assert_eq!(index.search("solar", 10).unwrap().len(), 1);

        let second = add(&store, "solar storms");
        assert_eq!(index.search("solar", 10).unwrap().len(), 2);

        store
            .update(
                &first,
                RecordPatch {
                    body: Some("wind turbines".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let hits = index.search("solar", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, second);

        store.delete(&second).unwrap();
        assert!(index.search("solar", 10).unwrap().is_empty());
    }

    #[test]
    fn empty_corpus_and_unknown_terms_yield_nothing() {
        let (_dir, store, index) = temp_setup("empty");
        assert!(index.search("anything", 10).unwrap().is_empty());

        add(&store, "some content here");
        assert!(index.search("zzzunknownzzz", 10).unwrap().is_empty());
        assert!(index.search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn concurrent_searches_stay_consistent_across_rebuilds() {
        let (_dir, store, index) = temp_setup("concurrent");
        add(&store, "the quick brown fox");
        add(&store, "a slow brown dog");

        // All searchers race the first (lazy) build and must see the same
        // two-document corpus.
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let index = &index;
                scope.spawn(move || {
                    let hits = index.search("brown", 10).unwrap();
                    assert_eq!(hits.len(), 2);
                });
            }
        });

        // A mutation leaves the build stale; racing searchers must all see
        // the rebuilt three-document corpus, never a torn build.
        add(&store, "brown bear territory");
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let index = &index;
                scope.spawn(move || {
                    let hits = index.search("brown", 10).unwrap();
                    assert_eq!(hits.len(), 3);
                });
            }
        });
    }

    #[test]
    fn top_k_truncates() {
        let (_dir, store, index) = temp_setup("top_k");
        for i in 0..5 {
            add(&store, &format!("shared term plus filler{i}"));
        }
        assert_eq!(index.search("shared", 3).unwrap().len(), 3);
        assert_eq!(index.search("shared", 10).unwrap().len(), 5);
        assert!(index.search("shared", 0).unwrap().is_empty());
    }
}
