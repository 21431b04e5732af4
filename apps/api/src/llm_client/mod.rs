/// LLM Client — the single point of entry for all chat-completion calls.
///
/// ARCHITECTURAL RULE: No other module may call the LLM HTTP API directly.
/// All LLM interactions go through the `ChatModel` trait defined here.
///
/// Callers that expect JSON use `call_structured`, which never infers failure
/// from the text of a reply: a reply either parses (`StructuredReply::Parsed`)
/// or is reported as `StructuredReply::Malformed` together with the raw payload.
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM client is not configured: {0}")]
    NotConfigured(String),
}

/// A single chat request: one system persona plus one user message.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    /// Ask the service to constrain output to a single JSON object.
    pub json_mode: bool,
}

/// The chat-model seam. `LlmClient` is the production implementation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// False when the client cannot possibly make a call (e.g. no credentials).
    fn is_available(&self) -> bool;

    /// Sends one request and returns the text of the first choice.
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, LlmError>;
}

/// Outcome of a call whose reply should be a JSON document of type `T`.
#[derive(Debug)]
pub enum StructuredReply<T> {
    Parsed(T),
    Malformed { raw: String, reason: String },
}

/// Calls the model in JSON mode and decodes the reply as `T`.
///
/// Transport and API failures are returned as `Err`; a reply that arrives but
/// does not decode is `Ok(StructuredReply::Malformed)`.
pub async fn call_structured<T: DeserializeOwned>(
    model: &dyn ChatModel,
    prompt: &str,
    system: &str,
) -> Result<StructuredReply<T>, LlmError> {
    let text = model
        .complete(ChatRequest {
            system,
            prompt,
            json_mode: true,
        })
        .await?;

    if text.trim().is_empty() {
        return Err(LlmError::EmptyContent);
    }

    let body = strip_json_fences(&text);
    match serde_json::from_str::<T>(body) {
        Ok(parsed) => Ok(StructuredReply::Parsed(parsed)),
        Err(e) => Ok(StructuredReply::Malformed {
            raw: text.clone(),
            reason: e.to_string(),
        }),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Extracts the text content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Settings for the production client.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

/// Chat-completions client with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Makes a raw call, returning the full response object.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    pub async fn call(
        &self,
        request: ChatRequest<'_>,
    ) -> Result<ChatCompletionResponse, LlmError> {
        if !self.is_available() {
            return Err(LlmError::NotConfigured("missing API key".to_string()));
        }

        let request_body = ChatCompletionRequest {
            model: &self.settings.model,
            max_tokens: MAX_TOKENS,
            temperature: self.settings.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let endpoint = self.endpoint();
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.settings.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let completion: ChatCompletionResponse = response.json().await?;

            if let Some(usage) = &completion.usage {
                debug!(
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(completion);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn is_available(&self) -> bool {
        !self.settings.api_key.trim().is_empty()
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, LlmError> {
        let response = self.call(request).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[derive(Debug, Deserialize)]
    struct Probe {
        key: String,
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_request_body_sets_json_response_format_only_in_json_mode() {
        let body = ChatCompletionRequest {
            model: "gpt-4o",
            max_tokens: 10,
            temperature: 0.7,
            messages: vec![],
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");

        let plain = ChatCompletionRequest {
            response_format: None,
            ..body
        };
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_completion_response_text_reads_first_choice() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"a\":1}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_client_without_key_is_unavailable() {
        let client = LlmClient::new(LlmSettings {
            api_key: "  ".to_string(),
            base_url: "http://localhost".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
        })
        .unwrap();
        assert!(!client.is_available());
    }

    #[tokio::test]
    async fn test_call_structured_parses_fenced_json() {
        let model = ScriptedModel::new(vec![Ok("```json\n{\"key\": \"v\"}\n```".to_string())]);
        let reply = call_structured::<Probe>(&model, "p", "s").await.unwrap();
        match reply {
            StructuredReply::Parsed(probe) => assert_eq!(probe.key, "v"),
            StructuredReply::Malformed { .. } => panic!("expected parsed reply"),
        }
    }

    #[tokio::test]
    async fn test_call_structured_reports_malformed_with_raw_payload() {
        let model = ScriptedModel::new(vec![Ok("not json at all".to_string())]);
        let reply = call_structured::<Probe>(&model, "p", "s").await.unwrap();
        match reply {
            StructuredReply::Malformed { raw, .. } => assert_eq!(raw, "not json at all"),
            StructuredReply::Parsed(_) => panic!("expected malformed reply"),
        }
    }

    #[tokio::test]
    async fn test_call_structured_propagates_transport_errors() {
        let model = ScriptedModel::new(vec![Err(LlmError::Api {
            status: 401,
            message: "bad key".to_string(),
        })]);
        let result = call_structured::<Probe>(&model, "p", "s").await;
        assert!(matches!(result, Err(LlmError::Api { status: 401, .. })));
    }
}
