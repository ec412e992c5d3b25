//! Splits a free-text request into content and evaluation sub-queries with a language model.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::llm::generate_llm_response;
use crate::prompts::{decomposition_prompt, DECOMPOSITION_SYSTEM_PROMPT};
use crate::types::Decomposition;
use crate::{LLMParams, RecommendError, Result, TARGET_LLM_REQUEST};

#[async_trait]
pub trait QueryDecomposer: Send + Sync {
    /// Returns both sub-query groups, each non-empty, or fails.
    async fn decompose(&self, query: &str) -> Result<Decomposition>;
}

/// Decomposer backed by a chat or completion model.
pub struct LlmDecomposer {
    params: LLMParams,
}

impl LlmDecomposer {
    pub fn new(params: LLMParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl QueryDecomposer for LlmDecomposer {
    async fn decompose(&self, query: &str) -> Result<Decomposition> {
        let prompt = decomposition_prompt(query);
        let response = generate_llm_response(DECOMPOSITION_SYSTEM_PROMPT, &prompt, &self.params).await?;
        let decomposition = parse_decomposition(&response)?;
        info!(target: TARGET_LLM_REQUEST,
            "Decomposed query into {} content and {} evaluation sub-queries",
            decomposition.content.len(),
            decomposition.evaluation.len()
        );
        Ok(decomposition)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecomposition {
    #[serde(rename = "주제관련")]
    content: Vec<String>,
    #[serde(rename = "평가관련")]
    evaluation: Vec<String>,
}

/// Parses the model's reply into a [`Decomposition`].
///
/// Text around the outermost braces is ignored, so chatter or code fences around the JSON
/// object are tolerated. Anything else, including extra keys or an empty group, is rejected.
pub fn parse_decomposition(text: &str) -> Result<Decomposition> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(RecommendError::MalformedDecomposition(format!(
            "no JSON object in response: {:?}",
            text
        )));
    };
    if end < start {
        return Err(RecommendError::MalformedDecomposition(format!(
            "no JSON object in response: {:?}",
            text
        )));
    }

    let raw: RawDecomposition = serde_json::from_str(&text[start..=end]).map_err(|e| {
        debug!(target: TARGET_LLM_REQUEST, "Unparseable decomposition: {}", text);
        RecommendError::MalformedDecomposition(e.to_string())
    })?;

    let content = clean(raw.content);
    let evaluation = clean(raw.evaluation);
    if content.is_empty() {
        return Err(RecommendError::MalformedDecomposition(
            "no content sub-queries".into(),
        ));
    }
    if evaluation.is_empty() {
        return Err(RecommendError::MalformedDecomposition(
            "no evaluation sub-queries".into(),
        ));
    }

    Ok(Decomposition::new(content, evaluation))
}

fn clean(texts: Vec<String>) -> Vec<String> {
    texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
