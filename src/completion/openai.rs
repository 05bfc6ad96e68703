use crate::completion::{CompletionBackend, CompletionError};
use crate::config::OpenAIConfig;
use crate::relay::prompt::{ChatMessage, Prompt};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::log::debug;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_text(self) -> Result<String, CompletionError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?;

        let text = choice.message.content.unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }
        Ok(text.to_string())
    }
}

pub struct OpenAIClient {
    client: Client,
    completions_url: String,
    api_key: String,
    model: String,
}
impl OpenAIClient {
    pub fn new(config: &OpenAIConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build OpenAI Reqwest client!")?;

        Ok(Self {
            client,
            completions_url: format!(
                "{}/v1/chat/completions",
                config.api_base_url.trim_end_matches('/')
            ),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAIClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let request_body = ChatCompletionRequest {
            model: &self.model,
            temperature: prompt.temperature,
            messages: prompt.messages(),
        };

        debug!("Sending {:?} prompt to {}", prompt.kind, self.model);
        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Status { status, body });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?
            .into_text()
    }
}
