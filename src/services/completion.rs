//! Client for the upstream chat completion API.
//!
//! Every call is stateless: one system turn, one user turn, no history.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 800;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const SYSTEM_PROMPT: &str = "You are StartupOS AI Coach, a specialized AI assistant for \
entrepreneurs. Provide practical, actionable startup advice. Keep responses concise but \
valuable. You cannot execute commands, browse the web, or perform actions outside of this \
conversation.";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream response had no completion choice")]
    EmptyChoices,
}

impl UpstreamError {
    /// Whether the failure happened talking to upstream, as opposed to
    /// upstream answering with something unusable.
    pub fn is_upstream_failure(&self) -> bool {
        match self {
            UpstreamError::Status { .. } => true,
            UpstreamError::Transport(e) => !e.is_decode(),
            UpstreamError::EmptyChoices => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub system_prompt: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_COMPLETIONS_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(settings: CompletionSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    pub fn build_request(&self, user_message: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![
                CompletionMessage {
                    role: Role::System,
                    content: self.settings.system_prompt.clone(),
                },
                CompletionMessage {
                    role: Role::User,
                    content: user_message.to_string(),
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Send `user_message` upstream and return the first choice's text.
    pub async fn complete(&self, api_key: &str, user_message: &str) -> Result<String, UpstreamError> {
        let request = self.build_request(user_message);
        debug!(url = %self.settings.url, model = %request.model, "calling completion API");

        let response = self
            .http
            .post(&self.settings.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "completion API returned an error");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(UpstreamError::EmptyChoices)
    }
}
