//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use storefront_payments::database::memory::{InMemoryOrderStore, InMemoryTransactionStore};
use storefront_payments::database::models::{NewTransaction, Order};
use storefront_payments::database::repository::{OrderStore, TransactionStore};
use storefront_payments::payments::error::{PaymentError, PaymentResult};
use storefront_payments::payments::gateway::PaymentGateway;
use storefront_payments::payments::providers::paystack::parse_paystack_event;
use storefront_payments::payments::signature::WebhookVerifier;
use storefront_payments::payments::types::{
    ChargeAuthorization, ChargeRequest, ChargeStatus, WebhookEvent,
};
use storefront_payments::services::reconciliation::{ReconciliationConfig, ReconciliationEngine};

pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";

/// Paystack stand-in: real event parsing, canned charge initialization.
pub struct FakePaystack;

#[async_trait]
impl PaymentGateway for FakePaystack {
    fn name(&self) -> &'static str {
        "paystack"
    }

    async fn create_charge(&self, request: ChargeRequest) -> PaymentResult<ChargeAuthorization> {
        Ok(ChargeAuthorization {
            authorization_url: format!("https://checkout.paystack.com/{}", request.reference),
            access_code: "ac_test".to_string(),
            reference: request.reference,
        })
    }

    async fn verify_charge(&self, reference: &str) -> PaymentResult<ChargeStatus> {
        Err(PaymentError::ProviderError {
            provider: "paystack".to_string(),
            message: format!("verification not scripted for {}", reference),
            provider_code: None,
            retryable: true,
        })
    }

    fn signature_header(&self) -> &'static str {
        "x-paystack-signature"
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        parse_paystack_event(payload)
    }
}

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn sign(body: &[u8]) -> String {
    WebhookVerifier::new(WEBHOOK_SECRET).sign(body).unwrap()
}

pub fn charge_event(event: &str, reference: &str, status: &str, amount_minor: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": event,
        "data": {
            "reference": reference,
            "status": status,
            "amount": amount_minor,
            "currency": "NGN",
            "gateway_response": "Approved"
        }
    }))
    .unwrap()
}

pub fn engine_with(
    transactions: Arc<dyn TransactionStore>,
    orders: Arc<dyn OrderStore>,
    config: ReconciliationConfig,
) -> ReconciliationEngine {
    ReconciliationEngine::new(
        transactions,
        orders,
        Arc::new(FakePaystack),
        WebhookVerifier::new(WEBHOOK_SECRET),
        config,
    )
}

pub fn fast_retries() -> ReconciliationConfig {
    ReconciliationConfig {
        max_attempts: 3,
        base_delay: std::time::Duration::from_millis(1),
    }
}

/// Seeds an order and one pending transaction for it.
pub async fn seed(
    transactions: &InMemoryTransactionStore,
    orders: &InMemoryOrderStore,
    reference: &str,
    order_number: &str,
    total: &str,
) -> Order {
    let order = Order::new(Uuid::new_v4(), order_number, dec(total), "NGN");
    orders.insert(order.clone()).await;
    add_transaction(transactions, &order, reference).await;
    order
}

pub async fn add_transaction(transactions: &InMemoryTransactionStore, order: &Order, reference: &str) {
    transactions
        .insert(NewTransaction {
            reference: reference.to_string(),
            order_id: order.id,
            store_id: order.store_id,
            amount: order.total_amount.clone(),
            currency: order.currency.clone(),
            provider: "paystack".to_string(),
        })
        .await
        .unwrap();
}
