use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

use crate::types::{SentenceHit, SentenceMetadata};
use crate::vector::similarity::{cosine_distance, is_searchable};
use crate::vector::{Embedder, SentenceIndex, TARGET_VECTOR};
use crate::{RecommendError, Result};

#[derive(Debug, Clone)]
struct IndexedSentence {
    metadata: SentenceMetadata,
    vector: Vec<f32>,
}

/// Exact cosine search over sentences held in memory.
///
/// Suited to small corpora and tests; every query scans all sentences.
pub struct MemoryIndex {
    name: String,
    embedder: Arc<dyn Embedder>,
    dimensions: Option<usize>,
    sentences: Vec<IndexedSentence>,
    positions: HashMap<String, usize>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.into(),
            embedder,
            dimensions: None,
            sentences: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Adds or replaces a sentence. All vectors must share one dimension and be finite and
    /// non-zero.
    pub fn insert(
        &mut self,
        sentence_id: impl Into<String>,
        course_id: impl Into<String>,
        review_id: Option<String>,
        vector: Vec<f32>,
    ) -> Result<()> {
        let sentence_id = sentence_id.into();
        if !is_searchable(&vector) {
            return Err(RecommendError::InvalidInput(format!(
                "sentence {} has a zero or non-finite vector",
                sentence_id
            )));
        }
        match self.dimensions {
            Some(dims) if dims != vector.len() => {
                return Err(RecommendError::InvalidInput(format!(
                    "index {} holds {}-dimensional vectors, got {}",
                    self.name,
                    dims,
                    vector.len()
                )));
            }
            None => self.dimensions = Some(vector.len()),
            _ => {}
        }

        let sentence = IndexedSentence {
            metadata: SentenceMetadata {
                sentence_id,
                course_id: course_id.into(),
                review_id,
            },
            vector,
        };

        match self.positions.get(&sentence.metadata.sentence_id) {
            Some(&pos) => self.sentences[pos] = sentence,
            None => {
                self.positions
                    .insert(sentence.metadata.sentence_id.clone(), self.sentences.len());
                self.sentences.push(sentence);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    fn search(
        &self,
        query: &[f32],
        n_results: usize,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<SentenceHit>> {
        let mut hits = Vec::new();
        for sentence in &self.sentences {
            if let Some(allowed) = allowed_course_ids {
                if !allowed.contains(&sentence.metadata.course_id) {
                    continue;
                }
            }
            hits.push(SentenceHit {
                sentence_id: sentence.metadata.sentence_id.clone(),
                course_id: sentence.metadata.course_id.clone(),
                distance: cosine_distance(query, &sentence.vector)?,
                review_id: sentence.metadata.review_id.clone(),
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.sentence_id.cmp(&b.sentence_id))
        });
        hits.truncate(n_results);
        Ok(hits)
    }
}

#[async_trait]
impl SentenceIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        texts: &[String],
        n_results: u64,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<Vec<SentenceHit>>> {
        let embeddings = self.embedder.embed(texts).await?;
        let limit = usize::try_from(n_results).unwrap_or(usize::MAX);

        for (text, embedding) in texts.iter().zip(&embeddings) {
            let wrong_size = self.dimensions.is_some_and(|dims| dims != embedding.len());
            if wrong_size || !is_searchable(embedding) {
                error!(target: TARGET_VECTOR,
                    "{}: unusable {}-dimensional embedding for {:?}", self.name, embedding.len(), text);
                return Err(RecommendError::upstream(
                    "embedder",
                    format!("unusable embedding for {:?}", text),
                ));
            }
        }

        let results = embeddings
            .iter()
            .map(|embedding| self.search(embedding, limit, allowed_course_ids))
            .collect::<Result<Vec<_>>>()?;

        debug!(target: TARGET_VECTOR,
            "{}: scanned {} sentences for {} queries",
            self.name,
            self.sentences.len(),
            texts.len()
        );
        Ok(results)
    }

    async fn get(&self, sentence_ids: &[String]) -> Result<Vec<SentenceMetadata>> {
        Ok(sentence_ids
            .iter()
            .filter_map(|id| self.positions.get(id))
            .map(|&pos| self.sentences[pos].metadata.clone())
            .collect())
    }
}
