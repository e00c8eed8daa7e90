//! OpenAI-compatible HTTP embedding client.
//!
//! Sends `POST {endpoint}/embeddings` with `{"model", "input": [...]}` and
//! reads `data[].embedding`, ordered by `data[].index`. Works against OpenAI,
//! Ollama's `/v1` API and most self-hosted servers. A bearer token is taken
//! from `EMBEDDING_API_KEY` when set.

use super::{EmbeddingError, EmbeddingService};
use crate::config::EmbeddingConfig;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable holding the optional bearer token.
pub const API_KEY_ENV: &str = "EMBEDDING_API_KEY";

const MAX_RETRIES: u32 = 2;

pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| EmbeddingError::Service("embedding.endpoint is not set".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Service(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
        })
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                std::thread::sleep(Duration::from_secs(1 << (attempt - 1)));
            }

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(ref key) = self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = response
                            .json()
                            .map_err(|e| EmbeddingError::Service(format!("bad response: {e}")))?;
                        return Ok(order_by_index(parsed.data));
                    }

                    let body_text = response.text().unwrap_or_default();
                    let err = EmbeddingError::Service(format!("HTTP {status}: {body_text}"));
                    // Rate limited or server error: retry; other client errors: fail now
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(EmbeddingError::Service(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbeddingError::Service("request failed".into())))
    }
}

fn order_by_index(mut items: Vec<EmbeddingItem>) -> Vec<Vec<f32>> {
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }
    items.into_iter().map(|item| item.embedding).collect()
}

impl EmbeddingService for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request(&[text.to_string()])?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            got => Err(EmbeddingError::PartialBatch { expected: 1, got }),
        }
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }
}
