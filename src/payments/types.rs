use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Outcome the gateway reports for a charge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Pending,
    Success,
    Failed,
    Abandoned,
    Reversed,
    Unknown,
}

impl GatewayState {
    pub fn from_provider_status(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "success" => GatewayState::Success,
            "pending" | "ongoing" | "processing" | "queued" => GatewayState::Pending,
            "failed" => GatewayState::Failed,
            "abandoned" => GatewayState::Abandoned,
            "reversed" => GatewayState::Reversed,
            _ => GatewayState::Unknown,
        }
    }

    /// Whether the charge has reached an outcome that will not change.
    /// An `abandoned` checkout can still be completed by the customer.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            GatewayState::Success | GatewayState::Failed | GatewayState::Reversed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub payer_email: String,
    /// Amount in the currency's minor unit (kobo for NGN).
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChargeAuthorization {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Authoritative charge status fetched from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeStatus {
    pub reference: String,
    pub state: GatewayState,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub raw: JsonValue,
}

/// A provider callback after its signature has been checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub reference: Option<String>,
    pub state: Option<GatewayState>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub payload: JsonValue,
}

impl WebhookEvent {
    /// Only these events settle a transaction. Other `charge.*` events
    /// (disputes) carry their reference elsewhere and are acknowledged as is.
    pub fn is_transaction_event(&self) -> bool {
        matches!(self.event_type.as_str(), "charge.success" | "charge.failed")
    }
}
