// Shared HTTP plumbing for the OpenAI-compatible model server

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::ModelConfig;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking client bound to one model server base URL
#[derive(Debug, Clone)]
pub struct ApiTransport {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl ApiTransport {
    #[inline]
    pub fn new(model: &ModelConfig) -> Result<Self> {
        let base_url = model
            .api_base_url()
            .context("Failed to generate model server URL from config")?;

        let api_key = Some(model.api_key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        Ok(Self {
            base_url,
            api_key,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: model.retry_attempts.max(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// POST a JSON body to `{base_url}{endpoint}` and return the response text
    #[inline]
    pub fn post_json<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<String> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build {endpoint} URL"))?;

        let request_json =
            serde_json::to_string(body).with_context(|| format!("Failed to serialize {endpoint} request"))?;

        debug!("POST {} ({} bytes)", url, request_json.len());

        self.make_request_with_retry(|| {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            request
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Request to {url} failed"))
    }

    /// GET `{base_url}{endpoint}` and return the response text
    #[inline]
    pub fn get(&self, endpoint: &str) -> Result<String> {
        let url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build {endpoint} URL"))?;

        debug!("GET {}", url);

        self.make_request_with_retry(|| {
            let mut request = self.agent.get(url.as_str());
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Request to {url} failed"))
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(match &error {
                        ureq::Error::StatusCode(status) => {
                            anyhow::anyhow!("Server error: HTTP {}", status)
                        }
                        _ => anyhow::anyhow!("Request error: {}", error),
                    });

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
