use crate::config::ModelOptions;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The endpoint could not be reached, timed out or answered with an HTTP error.
    #[error("Inference service unavailable at {endpoint}: {reason}")]
    ServiceUnavailable { endpoint: String, reason: String },

    /// The service answered but the body did not carry generated text, or the
    /// text held no usable answer.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::ServiceUnavailable { .. })
    }
}

/// Sends a prompt to a language model and returns the raw generated text.
pub trait ModelClient {
    fn model_name(&self) -> &str;

    /// Blocks until the model answers or the client's timeout expires.
    fn generate(&mut self, prompt: &str) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    url: String,
    model: String,
    think: Option<bool>,
}

impl OllamaClient {
    pub fn new(options: &ModelOptions) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ModelError::ServiceUnavailable {
                endpoint: options.endpoint.clone(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
            url: format!("{}/api/generate", options.endpoint),
            model: options.name.clone(),
            think: options.think,
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> ModelError {
        ModelError::ServiceUnavailable {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }
}

impl ModelClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&mut self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            think: self.think,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    self.unavailable(format!("request timed out ({e})"))
                } else {
                    self.unavailable(format!("is the server running? ({e})"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| self.unavailable(format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            return Err(self.unavailable(format!("http error {status}: {}", text.trim())));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::MalformedOutput(format!("unexpected response body: {e}")))?;
        Ok(parsed.response)
    }
}

/// How often a cycle retries an unreachable model before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &ModelOptions) -> Self {
        Self {
            retries: options.retries,
            backoff: options.retry_backoff,
        }
    }
}

/// Calls `client`, retrying only [`ModelError::ServiceUnavailable`].
pub fn generate_with_retries<M: ModelClient + ?Sized>(
    client: &mut M,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String, ModelError> {
    let mut attempt = 0;
    loop {
        match client.generate(prompt) {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                warn!(
                    "Model call failed ({e}); retry {attempt}/{} for {}",
                    policy.retries,
                    client.model_name()
                );
                let wait = policy.backoff * attempt;
                if !wait.is_zero() {
                    debug!("Waiting {wait:?} before retrying");
                    std::thread::sleep(wait);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
