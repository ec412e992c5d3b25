use serde::Serialize;

use crate::environment::{get_env_threshold, get_env_var_or};
use crate::{RecommendError, Result};

pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_EXAMPLES_PER_QUERY: usize = 4;
pub const DEFAULT_NEIGHBOR_COUNT: u64 = 256;
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.5;
/// Threshold the recommender uses for both of its passes.
pub const PASS_RELEVANCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_CONTENT_WEIGHT: f64 = 0.65;
pub const DEFAULT_EVALUATION_WEIGHT: f64 = 0.35;

/// Tuning for one reciprocal-rank-fusion pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrieverConfig {
    /// Number of courses returned, and the backfill target per sub-query.
    pub top_k: usize,
    /// Evidence sentences kept per course per sub-query.
    pub examples_per_query: usize,
    /// Nearest neighbours fetched per sub-query.
    pub neighbor_count: u64,
    /// Hits at or below this distance count directly; the rest only backfill.
    /// `None` counts every hit.
    pub relevance_threshold: Option<f32>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            examples_per_query: DEFAULT_EXAMPLES_PER_QUERY,
            neighbor_count: DEFAULT_NEIGHBOR_COUNT,
            relevance_threshold: Some(DEFAULT_RELEVANCE_THRESHOLD),
        }
    }
}

impl RetrieverConfig {
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RecommendError::InvalidInput("top_k must be at least 1".into()));
        }
        if self.neighbor_count == 0 {
            return Err(RecommendError::InvalidInput(
                "neighbor_count must be at least 1".into(),
            ));
        }
        if let Some(threshold) = self.relevance_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(RecommendError::InvalidInput(format!(
                    "relevance_threshold must be a non-negative number, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

/// Settings for the two-pass recommender.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommenderConfig {
    pub content: RetrieverConfig,
    pub evaluation: RetrieverConfig,
    pub content_weight: f64,
    pub evaluation_weight: f64,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        let pass = RetrieverConfig::default().with_threshold(Some(PASS_RELEVANCE_THRESHOLD));
        Self {
            content: pass.clone(),
            evaluation: pass,
            content_weight: DEFAULT_CONTENT_WEIGHT,
            evaluation_weight: DEFAULT_EVALUATION_WEIGHT,
        }
    }
}

impl RecommenderConfig {
    /// Builds the configuration from `RECSYS_*` environment variables, using the
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let top_k = get_env_var_or("RECSYS_TOP_K", defaults.content.top_k);
        let examples_per_query =
            get_env_var_or("RECSYS_EXAMPLES_PER_QUERY", defaults.content.examples_per_query);
        let neighbor_count = get_env_var_or("RECSYS_NEIGHBOR_COUNT", defaults.content.neighbor_count);

        let pass = |threshold| RetrieverConfig {
            top_k,
            examples_per_query,
            neighbor_count,
            relevance_threshold: threshold,
        };

        Self {
            content: pass(get_env_threshold(
                "RECSYS_CONTENT_THRESHOLD",
                defaults.content.relevance_threshold,
            )),
            evaluation: pass(get_env_threshold(
                "RECSYS_EVALUATION_THRESHOLD",
                defaults.evaluation.relevance_threshold,
            )),
            content_weight: get_env_var_or("RECSYS_CONTENT_WEIGHT", defaults.content_weight),
            evaluation_weight: get_env_var_or(
                "RECSYS_EVALUATION_WEIGHT",
                defaults.evaluation_weight,
            ),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.content.top_k = top_k;
        self.evaluation.top_k = top_k;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.content.validate()?;
        self.evaluation.validate()?;
        for (name, weight) in [
            ("content_weight", self.content_weight),
            ("evaluation_weight", self.evaluation_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecommendError::InvalidInput(format!(
                    "{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recommendation_pipeline() {
        let config = RecommenderConfig::default();
        assert_eq!(config.content.top_k, 8);
        assert_eq!(config.content.examples_per_query, 4);
        assert_eq!(config.content.neighbor_count, 256);
        assert_eq!(config.content.relevance_threshold, Some(0.6));
        assert_eq!(config.evaluation.relevance_threshold, Some(0.6));
        assert_eq!(config.content_weight, 0.65);
        assert_eq!(config.evaluation_weight, 0.35);
        assert!(config.validate().is_ok());

        assert_eq!(RetrieverConfig::default().relevance_threshold, Some(0.5));
    }

    #[test]
    fn rejects_degenerate_settings() {
        let mut config = RetrieverConfig::default();
        config.top_k = 0;
        assert!(matches!(config.validate(), Err(RecommendError::InvalidInput(_))));

        let config = RetrieverConfig::default().with_threshold(Some(f32::NAN));
        assert!(config.validate().is_err());

        let mut config = RecommenderConfig::default();
        config.evaluation_weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn top_k_applies_to_both_passes() {
        let config = RecommenderConfig::default().with_top_k(5);
        assert_eq!(config.content.top_k, 5);
        assert_eq!(config.evaluation.top_k, 5);
    }
}
