//! Chat-completions client for OpenAI-compatible endpoints.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::models::GenerationConfig;
use crate::domain::ports::{
    Generation, GenerationConstraints, GenerationError, Message, Role, TextGenerator, TokenUsage,
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiCompatibleGenerator {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleGenerator {
    /// Build a client from configuration. The API key is read from the
    /// environment variable the configuration names; local endpoints may run
    /// without one.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "no API key set for text generation");
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn error_from(response: Response) -> GenerationError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        warn!(status, "text generation API error");
        GenerationError::Api { status, body }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    #[instrument(skip(self, messages, constraints), fields(model = %constraints.model.as_deref().unwrap_or(&self.model)))]
    async fn generate(
        &self,
        messages: &[Message],
        constraints: &GenerationConstraints,
    ) -> Result<Generation, GenerationError> {
        let model = constraints.model.as_deref().unwrap_or(&self.model);
        let mut chat = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = &constraints.system_prompt {
            chat.push(ChatMessage {
                role: Role::System,
                content: system,
            });
        }
        chat.extend(messages.iter().map(|m| ChatMessage {
            role: m.role,
            content: &m.content,
        }));

        let request = ChatRequest {
            model,
            messages: chat,
            temperature: constraints.temperature.unwrap_or(self.temperature),
            max_tokens: constraints.max_tokens.unwrap_or(self.max_tokens),
            response_format: constraints.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, messages = request.messages.len(), "POST chat completion");

        let mut builder = self
            .http_client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("response had no message content".to_string()))?;

        Ok(Generation {
            content,
            model: body.model.unwrap_or_else(|| model.to_string()),
            usage: body.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}
