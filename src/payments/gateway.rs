use crate::payments::error::PaymentResult;
use crate::payments::types::{ChargeAuthorization, ChargeRequest, ChargeStatus, WebhookEvent};
use async_trait::async_trait;

/// The external payment provider as seen by the storefront.
///
/// The reference passed to [`create_charge`](PaymentGateway::create_charge) is
/// the one the provider echoes back on webhooks and must match the stored
/// transaction exactly. Amounts are always minor units.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeAuthorization>;

    async fn verify_charge(&self, reference: &str) -> PaymentResult<ChargeStatus>;

    /// Name of the header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Decodes an already-authenticated webhook body.
    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}
