//! Embedding generation through an HTTP embedding service

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Config, Result, TarsError};

/// Outcome of an embedding call.
///
/// A fallback is a placeholder, not a semantic embedding, and must never be
/// cached or trusted as one.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedded {
    /// Vector returned by the embedding service
    Vector(Vec<f32>),
    /// All-zero placeholder returned when the service failed
    Fallback(Vec<f32>),
}

impl Embedded {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn vector(&self) -> &[f32] {
        match self {
            Self::Vector(v) | Self::Fallback(v) => v,
        }
    }

    pub fn into_vector(self) -> Vec<f32> {
        match self {
            Self::Vector(v) | Self::Fallback(v) => v,
        }
    }
}

/// Something that turns text into an embedding without failing.
pub trait Embed {
    /// Name of the model producing the vectors, as reported in logs.
    fn model(&self) -> &str;

    /// Embed `text`, degrading to a fallback vector on any failure.
    fn embed(&self, text: &str) -> Embedded;
}

/// The fixed placeholder vector.
pub fn fallback_vector(dimension: usize) -> Vec<f32> {
    vec![0.0; dimension]
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Blocking client for `POST {base_url}/v1/embeddings`.
pub struct EmbeddingClient {
    endpoint: String,
    model: String,
    fallback_dimension: usize,
    client: reqwest::blocking::Client,
}

impl EmbeddingClient {
    /// Create a client for the service at `base_url` (scheme included).
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        fallback_dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            fallback_dimension,
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.service_url(),
            config.embedding_model.clone(),
            config.fallback_dimension,
            config.timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Call the service and surface every failure as an error.
    pub fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TarsError::Embedding(format!(
                "service returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| TarsError::Embedding(format!("malformed response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| TarsError::Embedding("no embedding in response".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

impl Embed for EmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Embedded {
        match self.try_embed(text) {
            Ok(vector) => Embedded::Vector(vector),
            Err(e) => {
                warn!("Embedding failed, using fallback vector: {}", e);
                Embedded::Fallback(fallback_vector(self.fallback_dimension))
            }
        }
    }
}
