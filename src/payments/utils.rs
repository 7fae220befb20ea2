use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// JSON-over-HTTP client shared by gateway implementations.
///
/// Retries connection failures, 429s and 5xx responses with exponential
/// backoff. 4xx bodies are returned to the caller as provider errors because
/// the gateway explains rejections there.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
            base_delay: Duration::from_secs(1),
        })
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1_u32 << attempt.min(6))
    }

    /// Sends a request and decodes a 2xx JSON body as `T`. For other statuses
    /// the provider's `message` field, when present, becomes the error text.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url).timeout(self.timeout);
            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(PaymentError::NetworkError {
                        message: format!("{} request failed: {}", self.provider, e),
                    });
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return serde_json::from_str::<T>(&text).map_err(|e| PaymentError::ProviderError {
                    provider: self.provider.to_string(),
                    message: format!("invalid provider JSON response: {}", e),
                    provider_code: None,
                    retryable: false,
                });
            }

            if status.as_u16() == 429 {
                if attempt < self.max_retries {
                    tokio::time::sleep(self.backoff(attempt)).await;
                    continue;
                }
                return Err(PaymentError::RateLimitError {
                    message: format!("{} rate limit exceeded", self.provider),
                    retry_after_seconds: retry_after,
                });
            }

            if status.is_server_error() && attempt < self.max_retries {
                warn!(
                    provider = self.provider,
                    status = %status,
                    attempt = attempt + 1,
                    "provider server error, retrying"
                );
                tokio::time::sleep(self.backoff(attempt)).await;
                continue;
            }

            return Err(PaymentError::ProviderError {
                provider: self.provider.to_string(),
                message: provider_message(&text).unwrap_or_else(|| format!("HTTP {}", status)),
                provider_code: Some(status.as_u16().to_string()),
                retryable: status.is_server_error(),
            });
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: format!("{} request failed", self.provider),
        }))
    }
}

/// Pulls the human-readable `message` out of an error body, if there is one.
fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
}
