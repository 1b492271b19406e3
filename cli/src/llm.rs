use anyhow::{Context, Result};
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::LlmConfig;
use pantry_core::generation::{ChatCompletionResponse, GenerationSettings};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to reach the text-generation API")]
    Request(#[from] reqwest::Error),

    #[error("text-generation API returned an unreadable response")]
    Decode(#[source] reqwest::Error),

    #[error("text-generation API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("text-generation API response contained no choices")]
    EmptyResponse,
}

/// Chat-completion client for the recipe generation endpoint.
pub struct CompletionClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    settings: GenerationSettings,
}

impl CompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "pantry/{} (recipe generator)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(config.timeout)
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            settings: config.settings.clone(),
        })
    }

    /// Send `prompt` as a single user message and return the raw answer text.
    pub async fn complete(&self, prompt: String) -> Result<String, UpstreamError> {
        let request = self.settings.request(prompt);

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let data: ChatCompletionResponse = resp.json().await.map_err(|e| {
            if e.is_decode() {
                UpstreamError::Decode(e)
            } else {
                UpstreamError::Request(e)
            }
        })?;
        data.into_first_content()
            .ok_or(UpstreamError::EmptyResponse)
    }
}
