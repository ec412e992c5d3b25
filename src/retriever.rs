//! Multi-query reciprocal-rank-fusion retrieval.
//!
//! Every sub-query is answered independently by the sentence index. Hits are grouped per
//! course, courses are ranked by their mean distance, and each course earns `1 / rank` from
//! that sub-query. Contributions are averaged over all sub-queries, so only the relative order
//! inside a sub-query matters and sub-queries with very different distance scales mix fairly.
//!
//! ```text
//! sub-query ─► index hits ─► threshold split ─┬─ retained ───────────┐
//!                                             └─ overflow (min-heap) ─┴─► backfill to top_k
//!           ─► mean distance per course ─► min rank ─► 1 / rank ─► running total
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::RetrieverConfig;
use crate::types::{Retrieval, SentenceHit, SubQuery};
use crate::vector::SentenceIndex;
use crate::{RecommendError, Result, TARGET_RETRIEVAL};

#[cfg(test)]
mod tests;

/// Runs one reciprocal-rank-fusion pass of `sub_queries` against `index`.
///
/// When `allowed_course_ids` is given, hits for any other course are ignored even if the
/// index returns them. An empty allowed set yields an empty result without querying.
pub async fn retrieve(
    index: &dyn SentenceIndex,
    sub_queries: &[SubQuery],
    config: &RetrieverConfig,
    allowed_course_ids: Option<&HashSet<String>>,
) -> Result<Retrieval> {
    if sub_queries.is_empty() {
        return Err(RecommendError::InvalidInput(
            "at least one sub-query is required".into(),
        ));
    }
    config.validate()?;

    if allowed_course_ids.is_some_and(HashSet::is_empty) {
        info!(target: TARGET_RETRIEVAL, "{}: no candidate courses to search", index.name());
        return Ok(Retrieval::default());
    }

    let texts: Vec<String> = sub_queries.iter().map(|q| q.text().to_string()).collect();
    let results = index
        .query(&texts, config.neighbor_count, allowed_course_ids)
        .await?;
    if results.len() != texts.len() {
        return Err(RecommendError::upstream(
            "vector index",
            format!(
                "{} returned {} result lists for {} queries",
                index.name(),
                results.len(),
                texts.len()
            ),
        ));
    }

    let mut board = ScoreBoard::default();
    for (position, (text, hits)) in texts.iter().zip(results).enumerate() {
        let hits: Vec<SentenceHit> = match allowed_course_ids {
            Some(allowed) => hits
                .into_iter()
                .filter(|hit| allowed.contains(&hit.course_id))
                .collect(),
            None => hits,
        };

        let ranking = rank_sub_query(hits, config);
        debug!(target: TARGET_RETRIEVAL,
            "{} sub-query {} {:?}: {} hits, {} within threshold, {} backfilled, {} courses ranked",
            index.name(),
            position,
            text,
            ranking.hit_count,
            ranking.within_threshold,
            ranking.backfilled,
            ranking.courses.len()
        );
        board.merge(ranking);
    }

    let retrieval = board.finish(sub_queries.len(), config.top_k);
    info!(target: TARGET_RETRIEVAL,
        "{}: {} sub-queries ranked {} courses, returning {}",
        index.name(),
        sub_queries.len(),
        retrieval.evidence.len(),
        retrieval.course_ids.len()
    );
    Ok(retrieval)
}

/// One course's standing within a single sub-query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CourseRank {
    pub course_id: String,
    pub mean_distance: f64,
    pub rank: usize,
    pub evidence: Vec<String>,
}

impl CourseRank {
    /// Reciprocal contribution of this course, always in `(0, 1]`.
    pub fn contribution(&self) -> f64 {
        1.0 / self.rank as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct SubQueryRanking {
    /// Courses in the order they were first retained.
    pub courses: Vec<CourseRank>,
    pub hit_count: usize,
    pub within_threshold: usize,
    pub backfilled: usize,
}

/// Hits and evidence retained for one course under one sub-query.
struct Retained {
    course_id: String,
    distances: Vec<f64>,
    evidence: Vec<String>,
}

/// A hit above the threshold, waiting for backfill. Orders closest-first in a max-heap,
/// ties broken by course id then sentence id.
struct QueuedHit(SentenceHit);

impl Ord for QueuedHit {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .distance
            .total_cmp(&self.0.distance)
            .then_with(|| other.0.course_id.cmp(&self.0.course_id))
            .then_with(|| other.0.sentence_id.cmp(&self.0.sentence_id))
    }
}

impl PartialOrd for QueuedHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedHit {}

/// Splits, backfills and ranks the hits of a single sub-query.
pub(crate) fn rank_sub_query(hits: Vec<SentenceHit>, config: &RetrieverConfig) -> SubQueryRanking {
    let mut ranking = SubQueryRanking {
        hit_count: hits.len(),
        ..Default::default()
    };
    let mut retained: Vec<Retained> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut overflow: BinaryHeap<QueuedHit> = BinaryHeap::new();

    let mut retain = |hit: SentenceHit| {
        let pos = *positions.entry(hit.course_id.clone()).or_insert_with(|| {
            retained.push(Retained {
                course_id: hit.course_id.clone(),
                distances: Vec::new(),
                evidence: Vec::new(),
            });
            retained.len() - 1
        });
        let course = &mut retained[pos];
        course.distances.push(f64::from(hit.distance));
        if course.evidence.len() < config.examples_per_query {
            course.evidence.push(hit.sentence_id);
        }
        retained.len()
    };

    let mut course_count = 0;
    for hit in hits {
        if !hit.distance.is_finite() {
            warn!(target: TARGET_RETRIEVAL,
                "Ignoring sentence {} with non-finite distance", hit.sentence_id);
            continue;
        }
        let above = config
            .relevance_threshold
            .is_some_and(|threshold| hit.distance > threshold);
        if above {
            overflow.push(QueuedHit(hit));
        } else {
            ranking.within_threshold += 1;
            course_count = retain(hit);
        }
    }

    // The threshold is a preference: top up with the closest leftovers until top_k courses
    // are represented or nothing is left.
    while course_count < config.top_k {
        let Some(QueuedHit(hit)) = overflow.pop() else {
            break;
        };
        ranking.backfilled += 1;
        course_count = retain(hit);
    }

    let means: Vec<f64> = retained
        .iter()
        .map(|course| course.distances.iter().sum::<f64>() / course.distances.len() as f64)
        .collect();
    let ranks = min_rank(&means);

    ranking.courses = retained
        .into_iter()
        .zip(means)
        .zip(ranks)
        .map(|((course, mean_distance), rank)| CourseRank {
            course_id: course.course_id,
            mean_distance,
            rank,
            evidence: course.evidence,
        })
        .collect();
    ranking
}

/// Ranks values ascending; equal values share the lowest rank of their group.
///
/// `[0.1, 0.1, 0.3]` ranks as `[1, 1, 3]`.
pub fn min_rank(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0; values.len()];
    let mut current = 0;
    for (pos, &idx) in order.iter().enumerate() {
        if pos == 0 || values[idx] != values[order[pos - 1]] {
            current = pos + 1;
        }
        ranks[idx] = current;
    }
    ranks
}

/// Running totals across sub-queries. Merging is a plain sum, so the order in which
/// sub-queries are merged does not change the scores.
#[derive(Debug, Default)]
struct ScoreBoard {
    /// First-seen order, used to break score ties deterministically.
    order: Vec<String>,
    totals: HashMap<String, f64>,
    evidence: HashMap<String, Vec<String>>,
}

impl ScoreBoard {
    fn merge(&mut self, ranking: SubQueryRanking) {
        for course in ranking.courses {
            let contribution = course.contribution();
            match self.totals.get_mut(&course.course_id) {
                Some(total) => *total += contribution,
                None => {
                    self.order.push(course.course_id.clone());
                    self.totals.insert(course.course_id.clone(), contribution);
                }
            }
            self.evidence
                .entry(course.course_id)
                .or_default()
                .extend(course.evidence);
        }
    }

    fn finish(self, query_count: usize, top_k: usize) -> Retrieval {
        let divisor = query_count as f64;
        let mut scored: Vec<(String, f64)> = self
            .order
            .into_iter()
            .map(|id| {
                let score = self.totals.get(&id).copied().unwrap_or_default() / divisor;
                (id, score)
            })
            .collect();

        // Stable, so ties keep first-seen order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        let (course_ids, scores) = scored.into_iter().unzip();
        Retrieval {
            course_ids,
            scores,
            evidence: self.evidence,
        }
    }
}
