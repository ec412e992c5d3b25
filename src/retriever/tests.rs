use std::collections::HashSet;

use super::*;
use crate::testing::{hit, CannedIndex};
use crate::types::QueryCategory;

fn config(top_k: usize, threshold: Option<f32>) -> RetrieverConfig {
    RetrieverConfig {
        top_k,
        examples_per_query: 4,
        neighbor_count: 256,
        relevance_threshold: threshold,
    }
}

fn queries(texts: &[&str]) -> Vec<SubQuery> {
    texts
        .iter()
        .map(|t| SubQuery::new(*t, QueryCategory::Content))
        .collect()
}

fn ids(retrieval: &Retrieval) -> Vec<&str> {
    retrieval.course_ids.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn backfills_course_above_threshold() {
    let index = CannedIndex::new("course_sentence").with_hits(
        "딥러닝 수업",
        vec![hit("s1", "A", 0.2), hit("s2", "A", 0.3), hit("s3", "B", 0.4)],
    );

    let retrieval = retrieve(&index, &queries(&["딥러닝 수업"]), &config(8, Some(0.35)), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["A", "B"]);
    assert_eq!(retrieval.scores, vec![1.0, 0.5]);
    assert_eq!(retrieval.evidence_for("A"), ["s1".to_string(), "s2".to_string()]);
    assert_eq!(retrieval.evidence_for("B"), ["s3".to_string()]);
}

#[test]
fn min_rank_shares_lowest_rank_on_ties() {
    assert_eq!(min_rank(&[0.1, 0.1, 0.3]), vec![1, 1, 3]);
    assert_eq!(min_rank(&[0.3, 0.1, 0.1, 0.2]), vec![4, 1, 1, 3]);
    assert_eq!(min_rank(&[0.5]), vec![1]);
    assert!(min_rank(&[]).is_empty());
}

#[tokio::test]
async fn empty_sub_queries_are_invalid() {
    let index = CannedIndex::new("course_sentence");
    let err = retrieve(&index, &[], &config(8, Some(0.5)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RecommendError::InvalidInput(_)));
    assert_eq!(index.query_count(), 0);
}

#[tokio::test]
async fn restriction_excludes_hits_an_unfiltered_index_returns() {
    let index = CannedIndex::new("review_sentence")
        .ignoring_filter()
        .with_hits(
            "학점을 잘 주시는 수업",
            vec![
                hit("r1", "1", 0.1),
                hit("r2", "4", 0.05),
                hit("r3", "2", 0.2),
                hit("r4", "3", 0.7),
            ],
        );
    let allowed: HashSet<String> = ["1", "2", "3"].iter().map(|s| s.to_string()).collect();

    let retrieval = retrieve(
        &index,
        &queries(&["학점을 잘 주시는 수업"]),
        &config(8, Some(0.6)),
        Some(&allowed),
    )
    .await
    .unwrap();

    assert_eq!(ids(&retrieval), vec!["1", "2", "3"]);
    assert!(!retrieval.evidence.contains_key("4"));
}

#[tokio::test]
async fn empty_restriction_returns_nothing_without_querying() {
    let index = CannedIndex::new("review_sentence").with_hits("q", vec![hit("r1", "1", 0.1)]);
    let allowed = HashSet::new();

    let retrieval = retrieve(&index, &queries(&["q"]), &config(8, Some(0.6)), Some(&allowed))
        .await
        .unwrap();

    assert!(retrieval.is_empty());
    assert!(retrieval.evidence.is_empty());
    assert_eq!(index.query_count(), 0);
}

#[tokio::test]
async fn scores_are_averaged_over_all_sub_queries() {
    let index = CannedIndex::new("course_sentence")
        .with_hits("q1", vec![hit("s1", "A", 0.1), hit("s2", "B", 0.2)])
        .with_hits("q2", vec![hit("s3", "B", 0.1)]);

    let retrieval = retrieve(&index, &queries(&["q1", "q2"]), &config(8, None), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["B", "A"]);
    assert_eq!(retrieval.scores, vec![0.75, 0.5]);
}

#[tokio::test]
async fn sub_query_without_hits_still_counts_in_the_average() {
    let index = CannedIndex::new("course_sentence").with_hits("q1", vec![hit("s1", "A", 0.1)]);

    let retrieval = retrieve(&index, &queries(&["q1", "nothing matches"]), &config(8, None), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["A"]);
    assert_eq!(retrieval.scores, vec![0.5]);
}

#[tokio::test]
async fn course_only_above_threshold_is_absent_once_top_k_is_met() {
    let index = CannedIndex::new("course_sentence").with_hits(
        "q",
        vec![hit("s1", "A", 0.1), hit("s2", "B", 0.2), hit("s3", "C", 0.9)],
    );

    let retrieval = retrieve(&index, &queries(&["q"]), &config(2, Some(0.5)), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["A", "B"]);
    assert!(!retrieval.evidence.contains_key("C"));
}

#[test]
fn backfill_pops_closest_leftovers_until_enough_courses() {
    let hits = vec![
        hit("s1", "A", 0.2),
        hit("s2", "A", 0.25),
        hit("s3", "B", 0.3),
        hit("s4", "C", 0.35),
    ];

    let ranking = rank_sub_query(hits, &config(2, Some(0.1)));

    assert_eq!(ranking.within_threshold, 0);
    assert_eq!(ranking.backfilled, 3);
    let courses: Vec<_> = ranking.courses.iter().map(|c| c.course_id.as_str()).collect();
    assert_eq!(courses, vec!["A", "B"]);
    assert!((ranking.courses[0].mean_distance - 0.225).abs() < 1e-6);
    assert_eq!(ranking.courses[0].evidence, vec!["s1", "s2"]);
    assert_eq!(ranking.courses[1].rank, 2);
}

#[test]
fn backfill_reaches_min_of_top_k_and_distinct_courses() {
    let hits: Vec<SentenceHit> = (0..10)
        .map(|i| hit(&format!("s{}", i), &format!("c{}", i), 0.7 + i as f32 * 0.01))
        .collect();

    let ranking = rank_sub_query(hits.clone(), &config(3, Some(0.0)));
    assert_eq!(ranking.courses.len(), 3);

    let ranking = rank_sub_query(hits, &config(20, Some(0.0)));
    assert_eq!(ranking.courses.len(), 10);
}

#[test]
fn queued_hits_pop_by_distance_then_course_then_sentence() {
    let mut heap = BinaryHeap::new();
    heap.push(QueuedHit(hit("s9", "B", 0.4)));
    heap.push(QueuedHit(hit("s2", "A", 0.4)));
    heap.push(QueuedHit(hit("s1", "A", 0.4)));
    heap.push(QueuedHit(hit("s5", "C", 0.3)));

    let order: Vec<String> = std::iter::from_fn(|| heap.pop().map(|q| q.0.sentence_id)).collect();
    assert_eq!(order, vec!["s5", "s1", "s2", "s9"]);
}

#[tokio::test]
async fn evidence_is_capped_per_sub_query() {
    let first: Vec<SentenceHit> = (0..6)
        .map(|i| hit(&format!("s{}", i), "A", 0.1 + i as f32 * 0.01))
        .collect();
    let second: Vec<SentenceHit> = (0..6)
        .map(|i| hit(&format!("t{}", i), "A", 0.1 + i as f32 * 0.01))
        .collect();
    let index = CannedIndex::new("course_sentence")
        .with_hits("q1", first)
        .with_hits("q2", second);

    let retrieval = retrieve(&index, &queries(&["q1", "q2"]), &config(8, Some(0.5)), None)
        .await
        .unwrap();

    let evidence = retrieval.evidence_for("A");
    assert_eq!(evidence.len(), 8);
    assert_eq!(&evidence[..4], ["s0", "s1", "s2", "s3"]);
    assert_eq!(&evidence[4..], ["t0", "t1", "t2", "t3"]);
}

#[tokio::test]
async fn truncates_to_top_k_with_scores_in_unit_interval() {
    let hits: Vec<SentenceHit> = (0..10)
        .map(|i| hit(&format!("s{}", i), &format!("c{}", i), 0.1 + i as f32 * 0.05))
        .collect();
    let reversed: Vec<SentenceHit> = (0..10)
        .map(|i| hit(&format!("t{}", i), &format!("c{}", i), 0.6 - i as f32 * 0.05))
        .collect();
    let index = CannedIndex::new("course_sentence")
        .with_hits("q1", hits)
        .with_hits("q2", reversed);

    let retrieval = retrieve(&index, &queries(&["q1", "q2"]), &config(3, None), None)
        .await
        .unwrap();

    assert_eq!(retrieval.course_ids.len(), 3);
    assert_eq!(retrieval.scores.len(), retrieval.course_ids.len());
    assert!(retrieval.scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    assert!(retrieval.scores.windows(2).all(|w| w[0] >= w[1]));
    // Courses outside the top 3 keep their evidence for later lookups.
    assert_eq!(retrieval.evidence.len(), 10);
}

#[tokio::test]
async fn ranking_ignores_distance_scale_within_a_sub_query() {
    let base = vec![
        hit("s1", "A", 0.3),
        hit("s2", "A", 0.5),
        hit("s3", "B", 0.35),
        hit("s4", "C", 0.6),
        hit("s5", "D", 0.2),
    ];
    let scaled: Vec<SentenceHit> = base
        .iter()
        .map(|h| SentenceHit {
            distance: h.distance * 1.7,
            ..h.clone()
        })
        .collect();
    let other = vec![hit("o1", "C", 0.1), hit("o2", "A", 0.4)];

    let plain = CannedIndex::new("plain")
        .with_hits("q1", base)
        .with_hits("q2", other.clone());
    let stretched = CannedIndex::new("stretched")
        .with_hits("q1", scaled)
        .with_hits("q2", other);

    let subs = queries(&["q1", "q2"]);
    let a = retrieve(&plain, &subs, &config(8, None), None).await.unwrap();
    let b = retrieve(&stretched, &subs, &config(8, None), None).await.unwrap();

    assert_eq!(a.course_ids, b.course_ids);
    assert_eq!(a.scores, b.scores);
}

#[tokio::test]
async fn repeated_queries_give_identical_output() {
    let index = CannedIndex::new("course_sentence")
        .with_hits(
            "q1",
            vec![hit("s1", "A", 0.2), hit("s2", "B", 0.2), hit("s3", "C", 0.4)],
        )
        .with_hits("q2", vec![hit("s4", "C", 0.1), hit("s5", "B", 0.7)]);
    let subs = queries(&["q1", "q2"]);

    let first = retrieve(&index, &subs, &config(8, Some(0.5)), None).await.unwrap();
    let second = retrieve(&index, &subs, &config(8, Some(0.5)), None).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn score_ties_keep_first_seen_order() {
    let index = CannedIndex::new("course_sentence")
        .with_hits("q", vec![hit("s1", "B", 0.1), hit("s2", "A", 0.1)]);

    let retrieval = retrieve(&index, &queries(&["q"]), &config(8, None), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["B", "A"]);
    assert_eq!(retrieval.scores, vec![1.0, 1.0]);
}

#[tokio::test]
async fn non_finite_distances_are_ignored() {
    let index = CannedIndex::new("course_sentence")
        .with_hits("q", vec![hit("s1", "A", 0.1), hit("s2", "B", f32::NAN)]);

    let retrieval = retrieve(&index, &queries(&["q"]), &config(8, Some(0.5)), None)
        .await
        .unwrap();

    assert_eq!(ids(&retrieval), vec!["A"]);
}

#[tokio::test]
async fn index_failure_is_upstream_unavailable() {
    let index = CannedIndex::new("course_sentence").unavailable();

    let err = retrieve(&index, &queries(&["q"]), &config(8, Some(0.5)), None)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}
