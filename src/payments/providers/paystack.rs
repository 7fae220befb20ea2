use crate::config::ConfigError;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{
    ChargeAuthorization, ChargeRequest, ChargeStatus, GatewayState, WebhookEvent,
};
use crate::payments::utils::PaymentHttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.paystack.co".to_string(),
            callback_url: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("PAYSTACK_SECRET_KEY")
            .map_err(|_| ConfigError::MissingVariable("PAYSTACK_SECRET_KEY".to_string()))?;

        Ok(Self {
            webhook_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            callback_url: std::env::var("PAYSTACK_CALLBACK_URL").ok(),
            timeout_secs: std::env::var("PAYSTACK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYSTACK_TIMEOUT_SECS".to_string()))?,
            max_retries: std::env::var("PAYSTACK_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYSTACK_MAX_RETRIES".to_string()))?,
            secret_key,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("PAYSTACK_SECRET_KEY".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYSTACK_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("PAYSTACK_TIMEOUT_SECS".to_string()));
        }
        Ok(())
    }

    /// Key used to sign webhooks. Paystack signs with the secret key unless a
    /// dedicated webhook secret is configured.
    pub fn webhook_signing_key(&self) -> &str {
        self.webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.secret_key)
    }
}

pub struct PaystackGateway {
    config: PaystackConfig,
    http: PaymentHttpClient,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            "paystack",
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn rejected(message: String) -> PaymentError {
        PaymentError::ProviderError {
            provider: "paystack".to_string(),
            message,
            provider_code: None,
            retryable: false,
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeAuthorization> {
        if request.amount_minor <= 0 {
            return Err(PaymentError::validation(
                "amount must be greater than zero",
                "amount",
            ));
        }
        if request.payer_email.trim().is_empty() {
            return Err(PaymentError::validation(
                "payer email is required for paystack initialization",
                "email",
            ));
        }

        let callback_url = request
            .callback_url
            .clone()
            .or_else(|| self.config.callback_url.clone());
        let payload = serde_json::json!({
            "email": request.payer_email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.reference,
            "callback_url": callback_url,
            "metadata": request.metadata,
        });

        let raw: PaystackEnvelope<PaystackInitializeData> = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
                Some(&self.config.secret_key),
                Some(&payload),
            )
            .await?;

        let data = match (raw.status, raw.data) {
            (true, Some(data)) => data,
            _ => return Err(Self::rejected(raw.message)),
        };
        if data.reference != request.reference {
            return Err(Self::rejected(format!(
                "paystack echoed reference {} for {}",
                data.reference, request.reference
            )));
        }
        info!(reference = %data.reference, "paystack charge initialized");

        Ok(ChargeAuthorization {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify_charge(&self, reference: &str) -> PaymentResult<ChargeStatus> {
        if reference.trim().is_empty() {
            return Err(PaymentError::validation("reference is required", "reference"));
        }
        let raw: PaystackEnvelope<JsonValue> = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                Some(&self.config.secret_key),
                None,
            )
            .await?;
        let data = match (raw.status, raw.data) {
            (true, Some(data)) => data,
            _ => return Err(Self::rejected(raw.message)),
        };
        let parsed: PaystackChargeData = serde_json::from_value(data.clone())
            .map_err(|e| Self::rejected(format!("invalid verify payload: {}", e)))?;

        Ok(ChargeStatus {
            reference: reference.to_string(),
            state: GatewayState::from_provider_status(&parsed.status),
            amount_minor: parsed.amount,
            currency: parsed.currency,
            gateway_response: parsed.gateway_response,
            raw: data,
        })
    }

    fn signature_header(&self) -> &'static str {
        PAYSTACK_SIGNATURE_HEADER
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        parse_paystack_event(payload)
    }
}

/// Decodes a Paystack webhook envelope (`{"event": ..., "data": {...}}`).
pub fn parse_paystack_event(payload: &[u8]) -> PaymentResult<WebhookEvent> {
    let parsed: JsonValue =
        serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
            message: format!("invalid webhook JSON payload: {}", e),
            field: Some("body".to_string()),
        })?;

    let event_type = parsed
        .get("event")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PaymentError::validation("webhook event type is missing", "event"))?
        .to_string();

    let data = parsed.get("data").cloned().unwrap_or(JsonValue::Null);
    let charge: PaystackChargeData = serde_json::from_value(data).unwrap_or_default();

    Ok(WebhookEvent {
        event_type,
        reference: charge.reference.filter(|r| !r.trim().is_empty()),
        state: if charge.status.is_empty() {
            None
        } else {
            Some(GatewayState::from_provider_status(&charge.status))
        },
        amount_minor: charge.amount,
        currency: charge.currency,
        payload: parsed,
    })
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PaystackInitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Default, Deserialize)]
struct PaystackChargeData {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}
