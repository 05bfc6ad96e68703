mod openai;

pub use openai::OpenAIClient;

use crate::relay::prompt::Prompt;
use async_trait::async_trait;
use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Completion API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Malformed completion response: {0}")]
    Malformed(String),
    #[error("No choices in completion response")]
    NoChoices,
    #[error("Completion response was empty")]
    Empty,
}
impl CompletionError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CompletionError::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS)
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the trimmed text of the first completion choice.
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError>;
}
