use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::DataIntegrityIssue;

/// Which half of a decomposed request a sub-query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    /// What the course teaches; searched against course-description sentences.
    Content,
    /// How the course is experienced; searched against review sentences.
    Evaluation,
}

/// A paraphrased piece of the user's request. The category is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubQuery {
    text: String,
    category: QueryCategory,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, category: QueryCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> QueryCategory {
        self.category
    }
}

/// The two sub-query groups produced from one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decomposition {
    pub content: Vec<SubQuery>,
    pub evaluation: Vec<SubQuery>,
}

impl Decomposition {
    pub fn new(content: Vec<String>, evaluation: Vec<String>) -> Self {
        Self {
            content: content
                .into_iter()
                .map(|t| SubQuery::new(t, QueryCategory::Content))
                .collect(),
            evaluation: evaluation
                .into_iter()
                .map(|t| SubQuery::new(t, QueryCategory::Evaluation))
                .collect(),
        }
    }
}

/// One nearest-neighbour result for one query text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceHit {
    pub sentence_id: String,
    pub course_id: String,
    /// Cosine distance, 0 = identical, 2 = opposite.
    pub distance: f32,
    /// Present for review sentences only.
    pub review_id: Option<String>,
}

/// Stored metadata of an indexed sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceMetadata {
    pub sentence_id: String,
    pub course_id: String,
    pub review_id: Option<String>,
}

/// Output of one retriever pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    /// Course ids, best first, at most `top_k`.
    pub course_ids: Vec<String>,
    /// Mean reciprocal-rank score per entry of `course_ids`.
    pub scores: Vec<f64>,
    /// Supporting sentence ids for every course that scored, including courses cut by `top_k`.
    pub evidence: HashMap<String, Vec<String>>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.course_ids.is_empty()
    }

    pub fn score_of(&self, course_id: &str) -> Option<f64> {
        self.course_ids
            .iter()
            .position(|id| id == course_id)
            .map(|pos| self.scores[pos])
    }

    pub fn evidence_for(&self, course_id: &str) -> &[String] {
        self.evidence
            .get(course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseRecord {
    pub id: String,
    pub course_name: String,
    pub course_no: String,
    pub course_class: String,
    pub department: String,
    pub credit: i64,
    pub course_type: String,
    pub instructor: String,
    pub timeslot: Option<String>,
    pub room: Option<String>,
    pub course_intro: Option<String>,
    pub prerequisite: Option<String>,
    pub syllabus: Option<String>,
}

impl CourseRecord {
    /// Intro, prerequisites and syllabus joined into one description document.
    pub fn document(&self) -> String {
        [&self.course_intro, &self.prerequisite, &self.syllabus]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewRecord {
    pub id: String,
    pub course_id: String,
    pub text: String,
}

/// Aggregated review ratings, each on a 1-5 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewStat {
    pub course_id: String,
    pub satisfaction: f64,
    pub workload: f64,
    pub difficulty: f64,
    pub delivery: f64,
    pub achievement: f64,
    /// 1: below expectations, 3: as expected, 5: above expectations.
    pub grade: f64,
    /// 1: never checked, 5: checked every session.
    pub attendance: f64,
}

/// Records loaded into the course database in one go, as read from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseDump {
    pub courses: Vec<CourseRecord>,
    #[serde(default)]
    pub reviews: Vec<ReviewRecord>,
    #[serde(default)]
    pub review_stats: Vec<ReviewStat>,
}

/// A course ranked after both passes, with the reviews that justified it.
#[derive(Debug, Clone, Serialize)]
pub struct CourseRecommendation {
    pub course: CourseRecord,
    /// The course description document the content pass searched.
    pub document: String,
    pub score: f64,
    pub content_score: f64,
    pub evaluation_score: f64,
    pub reviews: Vec<ReviewRecord>,
    pub review_stat: Option<ReviewStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationOutput {
    pub query: String,
    pub decomposition: Decomposition,
    pub recommendations: Vec<CourseRecommendation>,
    /// Evidence lookups that found nothing; these never fail the request.
    pub integrity_issues: Vec<DataIntegrityIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> CourseRecord {
        CourseRecord {
            id: "1".into(),
            course_name: "딥러닝".into(),
            course_no: "COSE474".into(),
            course_class: "00".into(),
            department: "컴퓨터학과".into(),
            credit: 3,
            course_type: "전공선택".into(),
            instructor: "김교수".into(),
            timeslot: None,
            room: None,
            course_intro: Some("신경망의 기초를 다룬다. ".into()),
            prerequisite: Some("  ".into()),
            syllabus: Some("1: CNN\n2: RNN".into()),
        }
    }

    #[test]
    fn document_skips_blank_sections() {
        assert_eq!(course().document(), "신경망의 기초를 다룬다.\n1: CNN\n2: RNN");
    }

    #[test]
    fn decomposition_assigns_categories() {
        let d = Decomposition::new(vec!["a".into()], vec!["b".into(), "c".into()]);
        assert!(d.content.iter().all(|q| q.category() == QueryCategory::Content));
        assert!(d
            .evaluation
            .iter()
            .all(|q| q.category() == QueryCategory::Evaluation));
        assert_eq!(d.evaluation[1].text(), "c");
    }

    #[test]
    fn retrieval_lookups() {
        let mut retrieval = Retrieval {
            course_ids: vec!["a".into(), "b".into()],
            scores: vec![1.0, 0.5],
            evidence: HashMap::new(),
        };
        retrieval.evidence.insert("a".into(), vec!["s1".into()]);

        assert_eq!(retrieval.score_of("b"), Some(0.5));
        assert_eq!(retrieval.score_of("z"), None);
        assert_eq!(retrieval.evidence_for("a"), ["s1".to_string()]);
        assert!(retrieval.evidence_for("b").is_empty());
    }
}
