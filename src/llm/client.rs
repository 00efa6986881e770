//! OpenAI-compatible LLM client.
//!
//! This client works with any OpenAI-compatible API endpoint. The
//! [`ChatBackend`] trait is the seam the answering fan-out and the judge
//! depend on, so they can be driven by any backend.

use crate::config::LlmConfig;
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Response from an LLM call including metadata.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Anything that can answer a chat-completion request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `messages` to `model`. `temperature = None` uses the backend default.
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    fn request<'a>(
        &self,
        model: &'a str,
        messages: &'a [Message],
        temperature: Option<f32>,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: Some(temperature.unwrap_or(self.config.temperature)),
        }
    }

    /// Send a chat completion request to the default model.
    pub async fn chat_default(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        self.chat(&self.config.model, &messages, None).await
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat_default(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(BenchError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let request = self.request(model, messages, temperature);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(BenchError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(BenchError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<LlmResponse> {
    let completion: ChatCompletionResponse = serde_json::from_str(body)?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BenchError::LlmApi("No choices in response".to_string()))?;

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
        usage: completion.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_string(&[
            Message::system("rubric"),
            Message::user("answer: 10"),
            Message::assistant("1"),
        ])
        .unwrap();
        assert_eq!(
            json,
            r#"[{"role":"system","content":"rubric"},{"role":"user","content":"answer: 10"},{"role":"assistant","content":"1"}]"#
        );
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        for base in ["http://localhost:8080", "http://localhost:8080/"] {
            let client = LlmClient::new(LlmConfig {
                api_base: base.to_string(),
                ..Default::default()
            });
            assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        }
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![Message::system("rubric"), Message::user("answer: 10")];
        let request = ChatCompletionRequest {
            model: "judge",
            messages: &messages,
            max_tokens: None,
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "judge");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_max_tokens_sent_only_when_configured() {
        let messages = vec![Message::user("document")];

        let client = LlmClient::new(LlmConfig::default());
        let json = serde_json::to_value(client.request("gpt", &messages, None)).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["temperature"], 0.0);

        let client = LlmClient::new(LlmConfig {
            max_tokens: Some(256),
            ..Default::default()
        });
        let json = serde_json::to_value(client.request("gpt", &messages, Some(0.5))).unwrap();
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_parse_completion_with_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "1"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        }"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.content, "1");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let body = r#"{"choices": []}"#;
        assert!(matches!(parse_completion(body), Err(BenchError::LlmApi(_))));
    }

    #[test]
    fn test_parse_completion_null_content() {
        let body = r#"{"choices": [{"message": {"content": null}}]}"#;
        assert_eq!(parse_completion(body).unwrap().content, "");
    }
}
