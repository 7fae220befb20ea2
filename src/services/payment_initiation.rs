use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::models::{NewTransaction, Order, PaymentStatus};
use crate::database::repository::{OrderStore, TransactionStore};
use crate::logging::mask_email;
use crate::middleware::logging::log_external_call;
use crate::payments::error::PaymentError;
use crate::payments::gateway::PaymentGateway;
use crate::payments::money::{is_supported_currency, normalize_currency, to_minor_units};
use crate::payments::types::{ChargeAuthorization, ChargeRequest};

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub email: String,
    pub amount: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InitiatePaymentResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Error)]
pub enum InitiationError {
    #[error("{message}")]
    Validation { message: String, field: String },
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("order {0} is already paid")]
    OrderAlreadyPaid(Uuid),
    #[error("payment provider error: {0}")]
    Gateway(#[from] PaymentError),
    #[error("store error: {0}")]
    Store(#[from] DatabaseError),
}

impl InitiationError {
    fn validation(message: impl Into<String>, field: &str) -> Self {
        InitiationError::Validation {
            message: message.into(),
            field: field.to_string(),
        }
    }
}

pub struct PaymentInitiationService {
    transactions: Arc<dyn TransactionStore>,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    callback_url: Option<String>,
}

impl PaymentInitiationService {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            transactions,
            orders,
            gateway,
            callback_url,
        }
    }

    /// Starts a charge for an existing order of `store_id`.
    ///
    /// The pending transaction is written before the gateway is called, so
    /// a request that dies mid-flight still leaves a reconcilable record. A
    /// gateway failure leaves that record pending.
    pub async fn initiate(
        &self,
        store_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse, InitiationError> {
        let email = request.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(InitiationError::validation(
                "a valid payer email is required",
                "email",
            ));
        }
        let currency = normalize_currency(&request.currency);
        if !is_supported_currency(&currency) {
            return Err(InitiationError::validation(
                format!("unsupported currency: {}", request.currency),
                "currency",
            ));
        }
        let amount_minor = to_minor_units(&request.amount, &currency).map_err(|e| {
            InitiationError::validation(e.user_message(), "amount")
        })?;

        let order = self
            .orders
            .find_by_id(request.order_id)
            .await?
            .filter(|order| order.store_id == store_id)
            .ok_or(InitiationError::OrderNotFound(request.order_id))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(InitiationError::OrderAlreadyPaid(order.id));
        }
        if order.total_amount != request.amount || normalize_currency(&order.currency) != currency {
            return Err(InitiationError::validation(
                format!(
                    "amount must equal the order total of {} {}",
                    order.total_amount, order.currency
                ),
                "amount",
            ));
        }

        let reference = build_reference(
            &order.order_number,
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
        );
        let tx = self
            .transactions
            .insert(NewTransaction {
                reference: reference.clone(),
                order_id: order.id,
                store_id,
                amount: request.amount.clone(),
                currency: currency.clone(),
                provider: self.gateway.name().to_string(),
            })
            .await?;
        info!(
            reference = %tx.reference,
            order_id = %order.id,
            amount_minor,
            currency = %currency,
            payer = %mask_email(email),
            "pending transaction recorded"
        );

        let charge = self.gateway.create_charge(ChargeRequest {
            payer_email: email.to_string(),
            amount_minor,
            currency,
            reference: reference.clone(),
            callback_url: self.callback_url.clone(),
            metadata: Some(charge_metadata(&order)),
        });
        let authorization = log_external_call(self.gateway.name(), "create_charge", charge)
            .await
            .map_err(|e| {
                error!(reference = %reference, error = %e, "charge initialization failed");
                InitiationError::Gateway(e)
            })?;

        self.record_access_code(&reference, &authorization).await;

        Ok(InitiatePaymentResponse {
            authorization_url: authorization.authorization_url,
            access_code: authorization.access_code,
            reference,
        })
    }

    /// The charge already exists at the gateway, so losing the access code
    /// is logged rather than failing the request.
    async fn record_access_code(&self, reference: &str, authorization: &ChargeAuthorization) {
        if let Err(e) = self
            .transactions
            .set_access_code(reference, &authorization.access_code)
            .await
        {
            warn!(reference, error = %e, "failed to store access code");
        }
    }
}

fn charge_metadata(order: &Order) -> serde_json::Value {
    json!({
        "order_id": order.id,
        "store_id": order.store_id,
        "order_number": order.order_number,
    })
}

/// `<order number>-<unix millis>-<8 hex chars of nonce>`, with anything
/// outside `[A-Za-z0-9-]` in the order number replaced by `-`.
///
/// The nonce keeps two initiations in the same millisecond apart.
pub fn build_reference(order_number: &str, timestamp_millis: i64, nonce: Uuid) -> String {
    let sanitized: String = order_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let nonce = nonce.simple().to_string();
    format!("{}-{}-{}", sanitized, timestamp_millis, &nonce[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{InMemoryOrderStore, InMemoryTransactionStore};
    use crate::database::models::TransactionStatus;
    use crate::payments::error::PaymentResult;
    use crate::payments::types::{ChargeStatus, WebhookEvent};
    use async_trait::async_trait;
    use std::str::FromStr;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CapturingGateway {
        requests: Mutex<Vec<ChargeRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl PaymentGateway for CapturingGateway {
        fn name(&self) -> &'static str {
            "paystack"
        }

        async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeAuthorization> {
            let reference = request.reference.clone();
            self.requests.lock().await.push(request);
            if self.fail {
                return Err(PaymentError::ProviderError {
                    provider: "paystack".to_string(),
                    message: "Invalid key".to_string(),
                    provider_code: None,
                    retryable: false,
                });
            }
            Ok(ChargeAuthorization {
                authorization_url: "https://checkout.paystack.com/abc".to_string(),
                access_code: "abc".to_string(),
                reference,
            })
        }

        async fn verify_charge(&self, _reference: &str) -> PaymentResult<ChargeStatus> {
            unreachable!("not used by initiation")
        }

        fn signature_header(&self) -> &'static str {
            "x-paystack-signature"
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            unreachable!("not used by initiation")
        }
    }

    struct Fixture {
        service: PaymentInitiationService,
        transactions: Arc<InMemoryTransactionStore>,
        gateway: Arc<CapturingGateway>,
        order: Order,
    }

    async fn fixture(total: &str, fail: bool) -> Fixture {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let gateway = Arc::new(CapturingGateway {
            fail,
            ..Default::default()
        });
        let order = Order::new(
            Uuid::new_v4(),
            "ORD 1/A",
            BigDecimal::from_str(total).unwrap(),
            "NGN",
        );
        orders.insert(order.clone()).await;
        let service = PaymentInitiationService::new(
            transactions.clone(),
            orders,
            gateway.clone(),
            Some("https://shop.example.com/checkout/complete".to_string()),
        );
        Fixture {
            service,
            transactions,
            gateway,
            order,
        }
    }

    fn request(order: &Order, amount: &str) -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            order_id: order.id,
            email: "buyer@example.com".to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            currency: "ngn".to_string(),
        }
    }

    #[tokio::test]
    async fn sends_minor_units_to_gateway() {
        let f = fixture("100", false).await;
        let response = f
            .service
            .initiate(f.order.store_id, request(&f.order, "100"))
            .await
            .unwrap();

        let requests = f.gateway.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount_minor, 10000);
        assert_eq!(requests[0].currency, "NGN");
        assert_eq!(requests[0].reference, response.reference);
        let metadata = requests[0].metadata.clone().unwrap();
        assert_eq!(metadata["order_number"], "ORD 1/A");
        assert_eq!(metadata["order_id"], f.order.id.to_string());

        let tx = f
            .transactions
            .find_by_reference(&response.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.access_code.as_deref(), Some("abc"));
        assert!(tx.reference.starts_with("ORD-1-A-"));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_transaction_pending() {
        let f = fixture("250.50", true).await;
        let err = f
            .service
            .initiate(f.order.store_id, request(&f.order, "250.50"))
            .await
            .unwrap_err();
        assert!(matches!(err, InitiationError::Gateway(_)));

        let rows = f.transactions.all().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Pending);
        assert_eq!(f.gateway.requests.lock().await[0].amount_minor, 25050);
    }

    #[tokio::test]
    async fn other_stores_order_is_not_found() {
        let f = fixture("100", false).await;
        let err = f
            .service
            .initiate(Uuid::new_v4(), request(&f.order, "100"))
            .await
            .unwrap_err();
        assert!(matches!(err, InitiationError::OrderNotFound(_)));
        assert!(f.transactions.all().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_amount_that_differs_from_order_total() {
        let f = fixture("100", false).await;
        let err = f
            .service
            .initiate(f.order.store_id, request(&f.order, "99"))
            .await
            .unwrap_err();
        assert!(matches!(err, InitiationError::Validation { ref field, .. } if field == "amount"));
        assert!(f.gateway.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_input_before_touching_stores() {
        let f = fixture("100", false).await;

        let mut bad_email = request(&f.order, "100");
        bad_email.email = "not-an-email".to_string();
        assert!(matches!(
            f.service.initiate(f.order.store_id, bad_email).await,
            Err(InitiationError::Validation { .. })
        ));

        let zero = request(&f.order, "0");
        assert!(matches!(
            f.service.initiate(f.order.store_id, zero).await,
            Err(InitiationError::Validation { .. })
        ));

        let sub_kobo = request(&f.order, "100.001");
        assert!(matches!(
            f.service.initiate(f.order.store_id, sub_kobo).await,
            Err(InitiationError::Validation { .. })
        ));
        assert!(f.transactions.all().await.is_empty());
    }

    #[test]
    fn reference_is_sanitized_order_number_millis_and_nonce() {
        assert_eq!(
            build_reference("ORD-1", 1700000000000, Uuid::nil()),
            "ORD-1-1700000000000-00000000"
        );
        assert_eq!(build_reference("#1001 ß", 5, Uuid::nil()), "-1001---5-00000000");
    }

    #[test]
    fn references_in_the_same_millisecond_differ() {
        let a = build_reference("ORD-1", 1700000000000, Uuid::new_v4());
        let b = build_reference("ORD-1", 1700000000000, Uuid::new_v4());
        assert_ne!(a, b);
        assert!(a.starts_with("ORD-1-1700000000000-"));
        assert!(b.starts_with("ORD-1-1700000000000-"));
    }
}
