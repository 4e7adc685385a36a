//! Model collaborator boundary.
//!
//! The gateway speaks OpenAI-style `chat/completions`. Failures surface as a
//! typed [`ModelError`] rather than in-band error strings, so callers can
//! drive fallback chains without sniffing response prefixes.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Transport(String),

    #[error("model gateway returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model response carried no content")]
    MissingContent,
}

/// One prompt sent to a model collaborator.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_role: String,
    pub prompt: String,
    /// Raw PNG bytes attached as an image part for vision-capable models.
    pub image: Option<Vec<u8>>,
    pub model: String,
}

impl ModelRequest {
    pub fn new(system_role: impl Into<String>, prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_role: system_role.into(),
            prompt: prompt.into(),
            image: None,
            model: model.into(),
        }
    }

    pub fn with_image(mut self, image: Option<Vec<u8>>) -> Self {
        self.image = image;
        self
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// HTTP-backed model client for an OpenRouter-compatible gateway.
pub struct HttpModelClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl HttpModelClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ModelError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_base: api_base.into(),
            token,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let token = self.token.as_deref().ok_or_else(|| ModelError::Api {
            status: 401,
            detail: "model gateway token not configured".to_string(),
        })?;

        let mut content = vec![ContentPart::text(&request.prompt)];
        if let Some(image) = &request.image {
            content.push(ContentPart::image_png(image));
        }

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            temperature: 0.1,
            max_tokens: 4096,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(request.system_role.clone()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Parts(content),
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ModelError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            let detail = detail.chars().take(500).collect::<String>();
            warn!(target: "llm", status, detail = %detail, "model gateway rejected request");
            return Err(ModelError::Api { status, detail });
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Transport(format!("invalid gateway response: {err}")))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content_text())
            .ok_or(ModelError::MissingContent)?;

        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl ContentPart {
    fn text(text: &str) -> Self {
        ContentPart::Text {
            text: text.to_string(),
        }
    }

    fn image_png(bytes: &[u8]) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{}", BASE64.encode(bytes)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl ChatCompletionMessage {
    fn content_text(&self) -> Option<String> {
        match &self.content {
            Some(ResponseContent::Text(value)) => Some(value.clone()),
            Some(ResponseContent::Parts(parts)) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_text_content() {
        let raw = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");
        let text = parsed.choices[0].message.content_text().expect("text");
        assert_eq!(text, "hello");
    }

    #[test]
    fn parses_multipart_content() {
        let raw = r#"{"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");
        let text = parsed.choices[0].message.content_text().expect("text");
        assert_eq!(text, "a\nb");
    }

    #[test]
    fn missing_content_is_none() {
        let raw = r#"{"choices":[{"message":{}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).expect("parse");
        assert!(parsed.choices[0].message.content_text().is_none());
    }
}
