pub mod api;
pub mod config;
pub mod db;
pub mod decomposer;
pub mod environment;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod recommender;
pub mod retriever;
pub mod types;
pub mod vector;

#[cfg(test)]
pub(crate) mod testing;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;

pub use error::{DataIntegrityIssue, RecommendError, Result};

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_RETRIEVAL: &str = "retrieval";

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

#[derive(Clone, Debug)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub temperature: f32,
    /// Upper bound for a single completion call, in seconds.
    pub timeout_secs: u64,
    pub max_attempts: u32,
}
