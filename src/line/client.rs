use crate::config::LineConfig;
use crate::line::types::{OutgoingMessage, ReplyMessageRequest};
use crate::line::ReplyToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::log::debug;

/// LINE rejects text messages longer than this many characters.
const MAX_TEXT_LENGTH: usize = 5000;

/// LINE accepts at most this many messages per reply.
const MAX_MESSAGES_PER_REPLY: usize = 5;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Reply API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[async_trait]
pub trait ReplyBackend: Send + Sync {
    /// Sends `text` as the one reply allowed for `token`.
    async fn reply(&self, token: ReplyToken, text: &str) -> Result<(), DeliveryError>;
}

pub struct LineClient {
    client: Client,
    reply_url: String,
    access_token: String,
}
impl LineClient {
    pub fn new(config: &LineConfig, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build LINE Reqwest client!")?;

        Ok(Self {
            client,
            reply_url: format!(
                "{}/v2/bot/message/reply",
                config.api_base_url.trim_end_matches('/')
            ),
            access_token,
        })
    }
}

#[async_trait]
impl ReplyBackend for LineClient {
    async fn reply(&self, token: ReplyToken, text: &str) -> Result<(), DeliveryError> {
        let request_body = ReplyMessageRequest {
            reply_token: token.as_str(),
            messages: split_text(text)
                .into_iter()
                .map(|text| OutgoingMessage::Text { text })
                .collect(),
        };

        debug!(
            "Sending {} reply message(s) for {token:?}",
            request_body.messages.len()
        );
        let response = self
            .client
            .post(&self.reply_url)
            .bearer_auth(&self.access_token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::Status { status, body });
        }

        Ok(())
    }
}

/// Splits text into as many LINE text messages as a single reply allows,
/// dropping anything past the last one.
fn split_text(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() && chunks.len() < MAX_MESSAGES_PER_REPLY {
        let end = rest
            .char_indices()
            .nth(MAX_TEXT_LENGTH)
            .map_or(rest.len(), |(idx, _)| idx);
        let (chunk, remaining) = rest.split_at(end);
        chunks.push(chunk);
        rest = remaining;
    }

    // The API rejects a reply without messages.
    if chunks.is_empty() {
        chunks.push(text);
    }
    chunks
}
