//! Two-pass course recommendation.
//!
//! The content sub-queries pick candidate courses from course-description sentences. The
//! evaluation sub-queries then search review sentences of those candidates only, and the two
//! scores are fused with fixed weights. Courses the evaluation pass does not return are dropped.
//! Finally the supporting review sentences are resolved to full reviews and course records.

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RecommenderConfig;
use crate::db::RecordStore;
use crate::decomposer::QueryDecomposer;
use crate::retriever::retrieve;
use crate::types::{
    CourseRecommendation, Decomposition, RecommendationOutput, Retrieval, SentenceMetadata,
};
use crate::vector::SentenceIndex;
use crate::{DataIntegrityIssue, RecommendError, Result, TARGET_RETRIEVAL};


/// A course's fused score and the two pass scores it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub course_id: String,
    pub score: f64,
    pub content_score: f64,
    pub evaluation_score: f64,
}

/// Combines both passes. Only courses present in `evaluation` survive, sorted by fused score
/// with ties kept in evaluation order.
pub fn fuse_scores(
    content: &Retrieval,
    evaluation: &Retrieval,
    content_weight: f64,
    evaluation_weight: f64,
) -> Vec<FusedScore> {
    let mut fused: Vec<FusedScore> = evaluation
        .course_ids
        .iter()
        .zip(&evaluation.scores)
        .filter_map(|(course_id, &evaluation_score)| {
            let Some(content_score) = content.score_of(course_id) else {
                warn!(target: TARGET_RETRIEVAL,
                    "Course {} was refined but never a content candidate", course_id);
                return None;
            };
            Some(FusedScore {
                course_id: course_id.clone(),
                score: content_weight * content_score + evaluation_weight * evaluation_score,
                content_score,
                evaluation_score,
            })
        })
        .collect();

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

pub struct Recommender {
    decomposer: Arc<dyn QueryDecomposer>,
    course_index: Arc<dyn SentenceIndex>,
    review_index: Arc<dyn SentenceIndex>,
    records: Arc<dyn RecordStore>,
    config: RecommenderConfig,
}

impl Recommender {
    pub fn new(
        decomposer: Arc<dyn QueryDecomposer>,
        course_index: Arc<dyn SentenceIndex>,
        review_index: Arc<dyn SentenceIndex>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            decomposer,
            course_index,
            review_index,
            records,
            config: RecommenderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RecommenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub async fn recommend(&self, query: &str) -> Result<RecommendationOutput> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RecommendError::InvalidInput("query is empty".into()));
        }
        self.config.validate()?;

        let decomposition = self.decomposer.decompose(query).await?;
        if decomposition.content.is_empty() || decomposition.evaluation.is_empty() {
            return Err(RecommendError::MalformedDecomposition(
                "both sub-query groups must be non-empty".into(),
            ));
        }

        let Some((fused, evaluation)) = self.rank(&decomposition).await? else {
            return Ok(RecommendationOutput {
                query: query.to_string(),
                decomposition,
                recommendations: Vec::new(),
                integrity_issues: Vec::new(),
            });
        };

        let (recommendations, integrity_issues) = self.hydrate(fused, &evaluation).await?;
        info!(target: TARGET_RETRIEVAL,
            "Recommended {} courses ({} integrity issues)",
            recommendations.len(),
            integrity_issues.len()
        );

        Ok(RecommendationOutput {
            query: query.to_string(),
            decomposition,
            recommendations,
            integrity_issues,
        })
    }

    /// Runs both passes. `None` when the content pass finds no candidates.
    async fn rank(
        &self,
        decomposition: &Decomposition,
    ) -> Result<Option<(Vec<FusedScore>, Retrieval)>> {
        let content = retrieve(
            self.course_index.as_ref(),
            &decomposition.content,
            &self.config.content,
            None,
        )
        .await?;
        if content.is_empty() {
            info!(target: TARGET_RETRIEVAL, "Content pass found no candidate courses");
            return Ok(None);
        }

        let candidates: HashSet<String> = content.course_ids.iter().cloned().collect();
        let evaluation = retrieve(
            self.review_index.as_ref(),
            &decomposition.evaluation,
            &self.config.evaluation,
            Some(&candidates),
        )
        .await?;

        let fused = fuse_scores(
            &content,
            &evaluation,
            self.config.content_weight,
            self.config.evaluation_weight,
        );
        Ok(Some((fused, evaluation)))
    }

    /// Resolves evidence sentences to reviews and attaches course records.
    async fn hydrate(
        &self,
        fused: Vec<FusedScore>,
        evaluation: &Retrieval,
    ) -> Result<(Vec<CourseRecommendation>, Vec<DataIntegrityIssue>)> {
        let sentence_ids: Vec<String> = fused
            .iter()
            .flat_map(|f| evaluation.evidence_for(&f.course_id).iter().cloned())
            .collect();
        let metadata: HashMap<String, SentenceMetadata> = if sentence_ids.is_empty() {
            HashMap::new()
        } else {
            self.review_index
                .get(&sentence_ids)
                .await?
                .into_iter()
                .map(|m| (m.sentence_id.clone(), m))
                .collect()
        };

        let hydrated = try_join_all(fused.into_iter().map(|f| {
            let evidence = evaluation.evidence_for(&f.course_id);
            self.hydrate_course(f, evidence, &metadata)
        }))
        .await?;

        let mut recommendations = Vec::new();
        let mut issues = Vec::new();
        for (recommendation, course_issues) in hydrated {
            issues.extend(course_issues);
            recommendations.extend(recommendation);
        }
        Ok((recommendations, issues))
    }

    async fn hydrate_course(
        &self,
        fused: FusedScore,
        evidence: &[String],
        metadata: &HashMap<String, SentenceMetadata>,
    ) -> Result<(Option<CourseRecommendation>, Vec<DataIntegrityIssue>)> {
        let mut issues = Vec::new();

        let mut seen = HashSet::new();
        let mut review_ids = Vec::new();
        for sentence_id in evidence {
            match metadata.get(sentence_id) {
                None => issues.push(DataIntegrityIssue::MissingSentence(sentence_id.clone())),
                Some(SentenceMetadata {
                    review_id: None, ..
                }) => issues.push(DataIntegrityIssue::SentenceWithoutReview(sentence_id.clone())),
                Some(SentenceMetadata {
                    review_id: Some(review_id),
                    ..
                }) => {
                    if seen.insert(review_id.clone()) {
                        review_ids.push(review_id.clone());
                    }
                }
            }
        }

        let reviews = self.records.get_reviews(&review_ids).await?;
        let found: HashSet<&str> = reviews.iter().map(|r| r.id.as_str()).collect();
        issues.extend(
            review_ids
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .map(|id| DataIntegrityIssue::MissingReview(id.clone())),
        );

        let course = match self.records.get_course(&fused.course_id).await? {
            Some(course) => course,
            None => {
                issues.push(DataIntegrityIssue::MissingCourse(fused.course_id.clone()));
                report(&issues);
                return Ok((None, issues));
            }
        };
        let review_stat = self.records.get_review_stat(&fused.course_id).await?;
        report(&issues);

        Ok((
            Some(CourseRecommendation {
                document: course.document(),
                course,
                score: fused.score,
                content_score: fused.content_score,
                evaluation_score: fused.evaluation_score,
                reviews,
                review_stat,
            }),
            issues,
        ))
    }
}

fn report(issues: &[DataIntegrityIssue]) {
    for issue in issues {
        warn!(target: TARGET_RETRIEVAL, "Data integrity: {}", issue);
    }
}
