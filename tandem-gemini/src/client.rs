//! Gemini review agent client using reqwest

use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{build_review_prompt, ReviewAgent, ReviewConfig, Secrets};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{parse_http_error, GenerateContentRequest, GenerateContentResponse};
use crate::{Error, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&ReviewConfig> for RetryPolicy {
    fn from(config: &ReviewConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

/// Review agent backed by the Gemini `generateContent` API
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: Url,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// Create a client for the configured model
    ///
    /// Fails with [`Error::Auth`] when `api_key` is missing or blank, so a
    /// misconfigured run stops before anything is sent.
    pub fn new(config: &ReviewConfig, api_key: Option<String>) -> Result<Self> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Auth(format!(
                    "Google API key not found. Set {} environment variable \
                     or add api_key to ~/.config/tandem/secrets.toml",
                    tandem_core::secrets::GOOGLE_API_KEY_ENV
                ))
            })?;

        let endpoint = generate_content_url(&config.base_url, &config.model)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::Http)?;

        info!(model = %config.model, "Created Gemini client");

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            endpoint,
            retry: RetryPolicy::from(config),
        })
    }

    /// Create a client with the key resolved from env or the secrets file
    pub fn from_secrets(config: &ReviewConfig, secrets: &Secrets) -> Result<Self> {
        Self::new(config, secrets.google_api_key())
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the resolved request URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send `prompt` and return the generated text, retrying transient failures
    pub async fn generate_content(&self, prompt: &str) -> Result<String> {
        let request = GenerateContentRequest::from_prompt(prompt);
        let mut attempt = 0;

        loop {
            match self.send_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Gemini request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &GenerateContentRequest) -> Result<String> {
        debug!(model = %self.model, "Sending generateContent request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(parse_http_error(status, &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("unexpected generateContent response: {}", e)))?;
        parsed.into_text()
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReviewAgent for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn review(&self, role: &str, context: &str) -> tandem_core::Result<String> {
        info!(role, context_len = context.len(), "Requesting review");
        let prompt = build_review_prompt(role, context);
        Ok(self.generate_content(&prompt).await?)
    }
}

/// Build `{base}/v1beta/models/{model}:generateContent`
fn generate_content_url(base_url: &str, model: &str) -> Result<Url> {
    let model = model.trim().trim_start_matches("models/");
    if model.is_empty() || model.contains('/') {
        return Err(Error::Config(format!("Invalid model name: {:?}", model)));
    }

    let base = Url::parse(base_url)
        .map_err(|e| Error::Config(format!("Invalid base URL {}: {}", base_url, e)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(Error::Config(format!("Unsupported URL scheme: {}", base.scheme())));
    }

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        base.as_str().trim_end_matches('/'),
        model
    );
    Url::parse(&url).map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", url, e)))
}
