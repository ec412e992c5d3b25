use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::{LLMClient, LLMParams, RecommendError, Result, TARGET_LLM_REQUEST};

const SERVICE: &str = "language model";

/// Sends one system + user prompt pair to the configured model and returns the reply text.
///
/// Each attempt is bounded by `params.timeout_secs`; failed attempts back off exponentially
/// up to `params.max_attempts`. The last failure is returned as `UpstreamUnavailable`.
pub async fn generate_llm_response(system: &str, prompt: &str, params: &LLMParams) -> Result<String> {
    let attempts = params.max_attempts.max(1);
    let mut backoff = 2;
    let mut last_error = String::new();

    debug!(target: TARGET_LLM_REQUEST, "Starting LLM request with model {}: {}", params.model, prompt);

    for attempt in 0..attempts {
        let request = send_request(system, prompt, params);
        match timeout(Duration::from_secs(params.timeout_secs), request).await {
            Ok(Ok(response)) if !response.trim().is_empty() => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received: {}", response);
                return Ok(response);
            }
            Ok(Ok(_)) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM returned an empty response");
                last_error = "empty response".to_string();
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
                last_error = e;
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out after {}s", params.timeout_secs);
                last_error = format!("timed out after {}s", params.timeout_secs);
            }
        }

        if attempt + 1 < attempts {
            info!(target: TARGET_LLM_REQUEST, "Retrying LLM request... ({}/{})", attempt + 2, attempts);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "Failed to generate response after {} attempts: {}", attempts, last_error);
    Err(RecommendError::upstream(SERVICE, last_error))
}

/// Builds a generation request with the system prompt in its own field.
fn ollama_request(system: &str, prompt: &str, params: &LLMParams) -> GenerationRequest<'static> {
    let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string())
        .system(system.to_string());
    request.options = Some(GenerationOptions::default().temperature(params.temperature));
    request
}

async fn send_request(
    system: &str,
    prompt: &str,
    params: &LLMParams,
) -> std::result::Result<String, String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            ollama
                .generate(ollama_request(system, prompt, params))
                .await
                .map(|response| response.response)
                .map_err(|e| e.to_string())
        }
        LLMClient::OpenAI(client) => {
            let messages: Vec<ChatCompletionRequestMessage> = vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| e.to_string())?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| e.to_string())?
                    .into(),
            ];
            let request = CreateChatCompletionRequestArgs::default()
                .model(params.model.clone())
                .temperature(params.temperature)
                .messages(messages)
                .build()
                .map_err(|e| e.to_string())?;

            let response = client
                .chat()
                .create(request)
                .await
                .map_err(|e| e.to_string())?;
            response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| "response contained no message content".to_string())
        }
    }
}
