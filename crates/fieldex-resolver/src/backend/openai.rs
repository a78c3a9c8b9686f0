//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::CompletionBackend;
use crate::error::ResolverError;
use crate::prompt::Prompt;
use crate::Result;

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Backend for any server speaking the `/chat/completions` protocol.
pub struct OpenAiBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    max_completion_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiBackend {
    /// Create a backend with an explicit key and client timeout.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client,
        })
    }

    /// Create a backend reading the API key from the environment variable `key_var`.
    pub fn from_env(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        key_var: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = std::env::var(key_var).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            debug!("{} is not set, sending unauthenticated requests", key_var);
        }
        Self::new(endpoint, model, api_key, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            max_completion_tokens: prompt.max_output_tokens,
        };

        trace!("POST {} ({} prompt chars)", url, prompt.user.len());

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResolverError::Timeout
            } else {
                ResolverError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ResolverError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ResolverError::Timeout
            } else {
                ResolverError::InvalidResponse(format!("failed to parse completion: {}", e))
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ResolverError::InvalidResponse("empty completion".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation_trims_endpoint() {
        let backend = OpenAiBackend::new(
            "http://localhost:8080/v1/",
            "gpt-5-mini",
            None,
            Duration::from_secs(8),
        )
        .unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1");
        assert_eq!(backend.model(), "gpt-5-mini");
        assert_eq!(backend.name(), "openai");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatRequest {
            model: "m",
            messages: [
                ChatMessage { role: "system", content: "s" },
                ChatMessage { role: "user", content: "u" },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            max_completion_tokens: 500,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["max_completion_tokens"], 500);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let backend = OpenAiBackend::new(
            "http://127.0.0.1:9/v1",
            DEFAULT_MODEL,
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let prompt = Prompt {
            system: "s".to_string(),
            user: "u".to_string(),
            max_output_tokens: 10,
        };

        let err = backend.complete(&prompt).await.unwrap_err();
        assert!(matches!(
            err,
            ResolverError::Transport(_) | ResolverError::Timeout
        ));
    }
}
