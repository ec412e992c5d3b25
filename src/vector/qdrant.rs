use async_trait::async_trait;
use futures::future::try_join_all;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, Filter, GetPoints, PointId, SearchParams, SearchPoints, Value, WithPayloadSelector,
    WithVectorsSelector,
};
use qdrant_client::Qdrant;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::types::{SentenceHit, SentenceMetadata};
use crate::vector::similarity::similarity_to_distance;
use crate::vector::{Embedder, SentenceIndex, COURSE_ID_KEY, REVIEW_ID_KEY, TARGET_VECTOR};
use crate::Result;

/// A sentence collection stored in Qdrant with cosine distance.
///
/// Points carry a `course_id` payload (and `review_id` for review sentences). Query texts
/// are embedded with the supplied [`Embedder`] before searching.
pub struct QdrantSentenceIndex {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantSentenceIndex {
    pub fn connect(
        url: &str,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        timeout: Duration,
    ) -> Result<Self> {
        let collection = collection.into();
        info!(target: TARGET_VECTOR, "Connecting to Qdrant at {} for collection {}", url, collection);
        let client = Qdrant::from_url(url).timeout(timeout).build()?;
        Ok(Self {
            client,
            collection,
            embedder,
        })
    }

    async fn search_one(
        &self,
        text: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<SentenceHit>> {
        let search_points = SearchPoints {
            collection_name: self.collection.clone(),
            vector,
            limit,
            filter,
            with_payload: Some(WithPayloadSelector::from(true)),
            with_vectors: Some(WithVectorsSelector::from(false)),
            params: Some(SearchParams {
                hnsw_ef: Some(limit.max(128)),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = match self.client.search_points(search_points).await {
            Ok(response) => response,
            Err(e) => {
                error!(target: TARGET_VECTOR,
                    "Search in {} failed for {:?}: {:?}", self.collection, text, e);
                return Err(e.into());
            }
        };

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let Some(sentence_id) = point.id.as_ref().and_then(point_id_to_string) else {
                warn!(target: TARGET_VECTOR, "Skipping point without id in {}", self.collection);
                continue;
            };
            let Some(course_id) = payload_string(&point.payload, COURSE_ID_KEY) else {
                warn!(target: TARGET_VECTOR,
                    "Skipping sentence {} in {}: no course_id payload", sentence_id, self.collection);
                continue;
            };
            // The server-side filter already excludes these; guard against stale payload indexes.
            if let Some(allowed) = allowed_course_ids {
                if !allowed.contains(&course_id) {
                    continue;
                }
            }
            hits.push(SentenceHit {
                sentence_id,
                course_id,
                distance: similarity_to_distance(point.score),
                review_id: payload_string(&point.payload, REVIEW_ID_KEY),
            });
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }
}

#[async_trait]
impl SentenceIndex for QdrantSentenceIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn query(
        &self,
        texts: &[String],
        n_results: u64,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<Vec<SentenceHit>>> {
        let vectors = self.embedder.embed(texts).await?;
        let filter = allowed_course_ids.map(course_filter);

        let searches = texts.iter().zip(vectors).map(|(text, vector)| {
            self.search_one(text, vector, n_results, filter.clone(), allowed_course_ids)
        });
        let results = try_join_all(searches).await?;

        debug!(target: TARGET_VECTOR,
            "{}: {} queries returned {} hits",
            self.collection,
            texts.len(),
            results.iter().map(Vec::len).sum::<usize>()
        );
        Ok(results)
    }

    async fn get(&self, sentence_ids: &[String]) -> Result<Vec<SentenceMetadata>> {
        if sentence_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get_points(GetPoints {
                collection_name: self.collection.clone(),
                ids: sentence_ids.iter().map(|id| string_to_point_id(id)).collect(),
                with_payload: Some(WithPayloadSelector::from(true)),
                with_vectors: Some(WithVectorsSelector::from(false)),
                ..Default::default()
            })
            .await?;

        let mut found: HashMap<String, SentenceMetadata> = HashMap::new();
        for point in response.result {
            let Some(sentence_id) = point.id.as_ref().and_then(point_id_to_string) else {
                continue;
            };
            let Some(course_id) = payload_string(&point.payload, COURSE_ID_KEY) else {
                warn!(target: TARGET_VECTOR,
                    "Sentence {} in {} has no course_id payload", sentence_id, self.collection);
                continue;
            };
            let review_id = payload_string(&point.payload, REVIEW_ID_KEY);
            found.insert(
                sentence_id.clone(),
                SentenceMetadata {
                    sentence_id,
                    course_id,
                    review_id,
                },
            );
        }

        // Keep the caller's order.
        Ok(sentence_ids
            .iter()
            .filter_map(|id| found.remove(id))
            .collect())
    }
}

/// Matches `course_id` payloads stored either as keywords or as integers.
///
/// Only ids whose integer form prints back unchanged get an integer match, so "007" never
/// selects the point stored as 7.
fn course_filter(allowed: &HashSet<String>) -> Filter {
    let mut ids: Vec<String> = allowed.iter().cloned().collect();
    ids.sort();
    let integers: Vec<i64> = ids
        .iter()
        .filter_map(|id| id.parse::<i64>().ok().filter(|n| n.to_string() == *id))
        .collect();

    let mut conditions = vec![Condition::matches(COURSE_ID_KEY, ids)];
    if !integers.is_empty() {
        conditions.push(Condition::matches(COURSE_ID_KEY, integers));
    }
    Filter::should(conditions)
}

fn point_id_to_string(id: &PointId) -> Option<String> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(num) => Some(num.to_string()),
        PointIdOptions::Uuid(uuid) => Some(uuid.clone()),
    }
}

/// Numeric ids map to numeric points, anything else is treated as a UUID.
fn string_to_point_id(id: &str) -> PointId {
    match id.parse::<u64>() {
        Ok(num) => PointId::from(num),
        Err(_) => PointId::from(id.to_string()),
    }
}

/// Reads a payload field that may have been stored as a string or an integer.
fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        Kind::IntegerValue(i) => Some(i.to_string()),
        _ => None,
    }
}
