//! Generation client — turns a prompt into poetry via an external
//! text-generation service.
//!
//! The consumer never special-cases generation failures: everything that
//! can go wrong is logged and replaced with [`FALLBACK_POETRY`], so a
//! drained batch is always archived. The HTTP call runs inside the
//! dispatched batch task and never blocks the capture loop.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;

/// Substituted for the service's output on any generation failure.
pub const FALLBACK_POETRY: &str = "Error generating poetic response";

/// Maximum length of the generated poem, in tokens.
pub const MAX_TOKENS: u32 = 200;

/// Sampling temperature. High on purpose: poems should wander.
pub const TEMPERATURE: f32 = 0.9;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Errors from the generation service.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Cannot connect to generation service at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Generation service returned HTTP {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    #[error("Failed to parse generation response: {0}")]
    ResponseParsing(String),
}

/// Seam for the text-generation service. The live implementation talks
/// HTTP; tests substitute a mock.
pub trait PoetryGenerator {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Generate with the fixed fallback on failure. Never errors.
pub async fn generate_or_fallback<G: PoetryGenerator>(generator: &G, prompt: &str) -> String {
    match generator.generate(prompt).await {
        Ok(poetry) => poetry,
        Err(e) => {
            tracing::error!(error = %e, "Error generating poetry");
            FALLBACK_POETRY.to_string()
        }
    }
}

// ═══════════════════════════════════════════════════════════
// HttpPoetryGenerator — Ollama-compatible /api/generate
// ═══════════════════════════════════════════════════════════

/// HTTP client for an Ollama-compatible generation endpoint.
pub struct HttpPoetryGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

/// Request body for /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

/// Response body from /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl HttpPoetryGenerator {
    pub fn new(base_url: &str, model: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    /// Client configured from the environment (NETPOET_GENERATE_URL,
    /// NETPOET_MODEL).
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::new(&config::generate_url(), &config::model())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl PoetryGenerator for HttpPoetryGenerator {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send {
        let url = format!("{}/api/generate", self.base_url);
        let request = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict: MAX_TOKENS,
                    temperature: TEMPERATURE,
                },
            })
            .send();
        let base_url = self.base_url.clone();

        async move {
            let response = request.await.map_err(|e| {
                if e.is_connect() {
                    GenerationError::Connection(base_url)
                } else if e.is_timeout() {
                    GenerationError::Timeout(REQUEST_TIMEOUT_SECS)
                } else {
                    GenerationError::HttpClient(e.to_string())
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::ServiceStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

            Ok(parsed.response.trim().to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════
// MockPoetryGenerator — tests only need the seam
// ═══════════════════════════════════════════════════════════

/// Mock generator returning a fixed response or a fixed failure.
pub struct MockPoetryGenerator {
    response: Result<String, String>,
}

impl MockPoetryGenerator {
    pub fn with_poem(poem: &str) -> Self {
        Self {
            response: Ok(poem.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
        }
    }
}

impl PoetryGenerator for MockPoetryGenerator {
    fn generate(&self, _prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send {
        let response = self
            .response
            .clone()
            .map_err(GenerationError::HttpClient);
        async move { response }
    }
}
