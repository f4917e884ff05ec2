//! Text completion through an HTTP language model service

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Config, Result, TarsError};

/// Maximum tokens requested per reply
const MAX_TOKENS: u32 = 200;

const TEMPERATURE: f32 = 0.7;

/// Sequences that end a reply
const STOP: &[&str] = &["User:", "Context:", "\n\n"];

/// Something that completes a prompt.
pub trait Complete {
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Blocking client for `POST {base_url}/v1/completions`.
pub struct CompletionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl CompletionClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.service_url(),
            config.completion_model.clone(),
            config.timeout(),
        )
    }

    /// Whether the service answers `GET /v1/models`.
    pub fn is_ready(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .is_ok_and(|r| r.status().is_success())
    }
}

impl Complete for CompletionClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .json(&CompletionRequest {
                model: &self.model,
                prompt,
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
                stop: STOP,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TarsError::Llm(format!("service returned {status}: {body}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| TarsError::Llm(format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| TarsError::Llm("no choices in response".to_string()))?;

        debug!("Completion returned {} characters", text.len());
        Ok(text)
    }
}
