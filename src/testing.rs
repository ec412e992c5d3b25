//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::decomposer::{parse_decomposition, QueryDecomposer};
use crate::types::{Decomposition, SentenceHit, SentenceMetadata};
use crate::vector::{Embedder, SentenceIndex};
use crate::{RecommendError, Result};

pub(crate) fn hit(sentence_id: &str, course_id: &str, distance: f32) -> SentenceHit {
    SentenceHit {
        sentence_id: sentence_id.to_string(),
        course_id: course_id.to_string(),
        distance,
        review_id: None,
    }
}

pub(crate) fn review_hit(
    sentence_id: &str,
    course_id: &str,
    review_id: &str,
    distance: f32,
) -> SentenceHit {
    SentenceHit {
        review_id: Some(review_id.to_string()),
        ..hit(sentence_id, course_id, distance)
    }
}

/// Returns prepared hits per query text, like a vector index whose answers are known.
pub(crate) struct CannedIndex {
    name: String,
    results: HashMap<String, Vec<SentenceHit>>,
    forgotten: HashSet<String>,
    apply_filter: bool,
    unavailable: bool,
    queries: AtomicUsize,
}

impl CannedIndex {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: HashMap::new(),
            forgotten: HashSet::new(),
            apply_filter: true,
            unavailable: false,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_hits(mut self, query: &str, hits: Vec<SentenceHit>) -> Self {
        self.results.entry(query.to_string()).or_default().extend(hits);
        self
    }

    /// Behave like an index that does not support course filters.
    pub fn ignoring_filter(mut self) -> Self {
        self.apply_filter = false;
        self
    }

    /// Drop a sentence's stored metadata so lookups miss it.
    pub fn forget_sentence(mut self, sentence_id: &str) -> Self {
        self.forgotten.insert(sentence_id.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SentenceIndex for CannedIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        texts: &[String],
        n_results: u64,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<Vec<SentenceHit>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(RecommendError::upstream("vector index", "connection refused"));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut hits: Vec<SentenceHit> = self
                    .results
                    .get(text)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|h| match (self.apply_filter, allowed_course_ids) {
                        (true, Some(allowed)) => allowed.contains(&h.course_id),
                        _ => true,
                    })
                    .collect();
                hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                hits.truncate(n_results as usize);
                hits
            })
            .collect())
    }

    async fn get(&self, sentence_ids: &[String]) -> Result<Vec<SentenceMetadata>> {
        if self.unavailable {
            return Err(RecommendError::upstream("vector index", "connection refused"));
        }

        let known: HashMap<&str, &SentenceHit> = self
            .results
            .values()
            .flatten()
            .map(|h| (h.sentence_id.as_str(), h))
            .collect();

        Ok(sentence_ids
            .iter()
            .filter(|id| !self.forgotten.contains(*id))
            .filter_map(|id| known.get(id.as_str()))
            .map(|h| SentenceMetadata {
                sentence_id: h.sentence_id.clone(),
                course_id: h.course_id.clone(),
                review_id: h.review_id.clone(),
            })
            .collect())
    }
}

/// Answers every request with the same model reply, parsed like a real one.
pub(crate) struct StubDecomposer {
    reply: String,
    unavailable: bool,
}

impl StubDecomposer {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            reply: String::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl QueryDecomposer for StubDecomposer {
    async fn decompose(&self, _query: &str) -> Result<Decomposition> {
        if self.unavailable {
            return Err(RecommendError::upstream("language model", "timed out after 60s"));
        }
        parse_decomposition(&self.reply)
    }
}

/// Looks texts up in a fixed table of vectors.
pub(crate) struct TableEmbedder(HashMap<String, Vec<f32>>);

impl TableEmbedder {
    pub fn new<const N: usize>(entries: [(&str, Vec<f32>); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(text, vector)| (text.to_string(), vector))
                .collect(),
        )
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.0
                    .get(t)
                    .cloned()
                    .ok_or_else(|| RecommendError::upstream("embedder", "unknown text"))
            })
            .collect()
    }
}
