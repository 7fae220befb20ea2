//! Webhook reconciliation.
//!
//! Turns an authenticated provider event into exactly one terminal
//! transition of a [`Transaction`], then pushes a `paid` outcome onto the
//! linked order. Re-deliveries and concurrent deliveries of the same event
//! are absorbed by the store's guarded `pending -> terminal` write; nothing
//! here relies on in-process locking.

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{parse_var, ConfigError};
use crate::database::error::{DatabaseError, ONE_PAID_PER_ORDER};
use crate::database::models::{Transaction, TransactionStatus};
use crate::database::repository::{OrderStore, TransactionStore};
use crate::payments::gateway::PaymentGateway;
use crate::payments::money::{from_minor_units, normalize_currency, to_minor_units};
use crate::payments::signature::WebhookVerifier;
use crate::payments::types::{ChargeStatus, GatewayState, WebhookEvent};

/// Retry policy for the order update that follows a `paid` transition.
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: parse_var("ORDER_PROPAGATION_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_var(
                "ORDER_PROPAGATION_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "ORDER_PROPAGATION_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(10))
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook authenticity check failed: {0}")]
    Authenticity(String),
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
    #[error("unknown transaction reference: {0}")]
    UnknownReference(String),
    #[error("store error: {0}")]
    Store(#[from] DatabaseError),
}

impl ReconcileError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            ReconcileError::Authenticity(_) | ReconcileError::MalformedPayload(_) => 400,
            ReconcileError::UnknownReference(_) => 404,
            ReconcileError::Store(_) => 500,
        }
    }
}

/// The transaction was recorded but its order could not be updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationWarning {
    OrderNotFound { order_id: Uuid },
    OrderUpdateFailed { order_id: Uuid, attempts: u32, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// This delivery performed the `pending -> terminal` transition.
    Applied {
        reference: String,
        status: TransactionStatus,
        propagation: Option<PropagationWarning>,
    },
    /// The transaction was already terminal; nothing was written.
    Duplicate {
        reference: String,
        status: TransactionStatus,
    },
    /// Authentic but irrelevant or non-terminal event.
    Ignored { event: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied {
                propagation: Some(_),
                ..
            } => "applied_with_warning",
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::Duplicate { .. } => "duplicate",
            ReconcileOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// What a provider report means for a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    Failure,
    NonTerminal,
}

fn classify_event(event: &WebhookEvent) -> Verdict {
    match &event.state {
        Some(GatewayState::Success) if event.event_type == "charge.success" => Verdict::Success,
        Some(state) => classify_state(state),
        None => Verdict::NonTerminal,
    }
}

/// `abandoned` and unrecognised states can still turn into a payment, so
/// only the expiry window may fail them.
fn classify_state(state: &GatewayState) -> Verdict {
    match state {
        GatewayState::Success => Verdict::Success,
        GatewayState::Failed | GatewayState::Reversed => Verdict::Failure,
        GatewayState::Pending | GatewayState::Abandoned | GatewayState::Unknown => {
            Verdict::NonTerminal
        }
    }
}

/// Amount and currency the provider reported alongside an outcome.
struct Reported<'a> {
    amount_minor: Option<i64>,
    currency: Option<&'a str>,
}

pub struct ReconciliationEngine {
    transactions: Arc<dyn TransactionStore>,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            transactions,
            orders,
            gateway,
            verifier,
            config,
        }
    }

    /// Header the gateway puts its webhook signature in.
    pub fn signature_header(&self) -> &'static str {
        self.gateway.signature_header()
    }

    /// Handles one webhook delivery. `raw` must be the request body exactly
    /// as received.
    pub async fn handle_webhook(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if let Err(e) = self.verifier.verify(raw, signature) {
            warn!(
                provider = self.gateway.name(),
                error = %e,
                "rejecting webhook with invalid signature"
            );
            return Err(ReconcileError::Authenticity(e.to_string()));
        }

        let event = self
            .gateway
            .parse_webhook_event(raw)
            .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

        if !event.is_transaction_event() {
            info!(event_type = %event.event_type, "ignoring webhook event that settles no transaction");
            return Ok(ReconcileOutcome::Ignored {
                event: event.event_type,
            });
        }

        let reference = event
            .reference
            .clone()
            .ok_or_else(|| ReconcileError::MalformedPayload("missing data.reference".to_string()))?;

        let tx = self
            .transactions
            .find_by_reference(&reference)
            .await?
            .ok_or_else(|| {
                warn!(reference = %reference, "webhook for unknown transaction reference");
                ReconcileError::UnknownReference(reference.clone())
            })?;

        let verdict = classify_event(&event);
        let reported = Reported {
            amount_minor: event.amount_minor,
            currency: event.currency.as_deref(),
        };
        self.apply(tx, verdict, reported, &event.event_type, event.payload.clone())
            .await
    }

    /// Applies an authoritative status fetched from the gateway, as the
    /// pending sweeper does for transactions whose webhook never arrived.
    pub async fn apply_charge_status(
        &self,
        tx: Transaction,
        status: ChargeStatus,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let verdict = classify_state(&status.state);
        let reported = Reported {
            amount_minor: status.amount_minor,
            currency: status.currency.as_deref(),
        };
        self.apply(tx, verdict, reported, "verify", status.raw.clone())
            .await
    }

    /// Fails a transaction that stayed pending past its window.
    pub async fn expire(&self, tx: &Transaction) -> Result<ReconcileOutcome, ReconcileError> {
        info!(reference = %tx.reference, "expiring stale pending transaction");
        self.settle(tx, TransactionStatus::Failed, json!({ "reason": "expired" }))
            .await
    }

    async fn apply(
        &self,
        tx: Transaction,
        verdict: Verdict,
        reported: Reported<'_>,
        event: &str,
        payload: JsonValue,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if tx.status.is_terminal() {
            if verdict == Verdict::Success && tx.status == TransactionStatus::Failed {
                warn!(
                    reference = %tx.reference,
                    "success reported for a failed transaction; manual review required"
                );
            } else {
                info!(
                    reference = %tx.reference,
                    status = %tx.status,
                    "duplicate delivery for settled transaction"
                );
            }
            return Ok(ReconcileOutcome::Duplicate {
                reference: tx.reference,
                status: tx.status,
            });
        }

        match verdict {
            Verdict::NonTerminal => {
                info!(reference = %tx.reference, event, "non-terminal charge status, nothing to apply");
                Ok(ReconcileOutcome::Ignored {
                    event: event.to_string(),
                })
            }
            Verdict::Failure => self.settle(&tx, TransactionStatus::Failed, payload).await,
            Verdict::Success => {
                if !self.amount_matches(&tx, &reported) {
                    error!(
                        reference = %tx.reference,
                        expected_amount = %tx.amount,
                        expected_currency = %tx.currency,
                        reported_amount = ?reported
                            .amount_minor
                            .and_then(|minor| from_minor_units(minor, &tx.currency).ok()),
                        reported_currency = ?reported.currency,
                        "charged amount does not match transaction; marking failed for review"
                    );
                    return self.settle(&tx, TransactionStatus::Failed, payload).await;
                }
                if self.transactions.has_paid_for_order(tx.order_id).await? {
                    return self.reject_duplicate_charge(&tx, payload).await;
                }
                self.settle(&tx, TransactionStatus::Paid, payload).await
            }
        }
    }

    fn amount_matches(&self, tx: &Transaction, reported: &Reported<'_>) -> bool {
        if let Some(currency) = reported.currency {
            if normalize_currency(currency) != normalize_currency(&tx.currency) {
                return false;
            }
        }
        match reported.amount_minor {
            Some(amount) => to_minor_units(&tx.amount, &tx.currency).ok() == Some(amount),
            None => true,
        }
    }

    async fn reject_duplicate_charge(
        &self,
        tx: &Transaction,
        payload: JsonValue,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        error!(
            reference = %tx.reference,
            order_id = %tx.order_id,
            "order already paid by another transaction; duplicate charge, refund required"
        );
        self.write_terminal(tx, TransactionStatus::Failed, payload)
            .await
    }

    /// Guarded `pending -> status` write followed, for `paid`, by order
    /// propagation.
    async fn settle(
        &self,
        tx: &Transaction,
        status: TransactionStatus,
        payload: JsonValue,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if status != TransactionStatus::Paid {
            return self.write_terminal(tx, status, payload).await;
        }

        match self
            .transactions
            .settle_pending(&tx.reference, TransactionStatus::Paid, payload.clone(), Utc::now())
            .await
        {
            Ok(Some(updated)) => {
                info!(
                    reference = %updated.reference,
                    order_id = %updated.order_id,
                    "transaction marked paid"
                );
                let propagation = self.propagate(&updated).await;
                Ok(ReconcileOutcome::Applied {
                    reference: updated.reference,
                    status: updated.status,
                    propagation,
                })
            }
            Ok(None) => self.lost_race(&tx.reference).await,
            Err(e) if e.is_conflict_on(ONE_PAID_PER_ORDER) => {
                self.reject_duplicate_charge(tx, payload).await
            }
            Err(e) => {
                error!(reference = %tx.reference, error = %e, "guarded transaction update failed");
                Err(e.into())
            }
        }
    }

    async fn write_terminal(
        &self,
        tx: &Transaction,
        status: TransactionStatus,
        payload: JsonValue,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self
            .transactions
            .settle_pending(&tx.reference, status, payload, Utc::now())
            .await?
        {
            Some(updated) => {
                info!(reference = %updated.reference, status = %updated.status, "transaction settled");
                Ok(ReconcileOutcome::Applied {
                    reference: updated.reference,
                    status: updated.status,
                    propagation: None,
                })
            }
            None => self.lost_race(&tx.reference).await,
        }
    }

    /// Another delivery settled the transaction between lookup and write.
    async fn lost_race(&self, reference: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let current = self
            .transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ReconcileError::UnknownReference(reference.to_string()))?;
        info!(reference, status = %current.status, "concurrent delivery already settled transaction");
        Ok(ReconcileOutcome::Duplicate {
            reference: current.reference,
            status: current.status,
        })
    }

    /// Marks the linked order paid, retrying transient store failures. A
    /// failure here never undoes the transaction update.
    async fn propagate(&self, tx: &Transaction) -> Option<PropagationWarning> {
        let mut attempt = 0;
        loop {
            match self.orders.mark_paid(tx.order_id, Utc::now()).await {
                Ok(Some(order)) => {
                    info!(
                        reference = %tx.reference,
                        order_id = %order.id,
                        order_status = %order.status,
                        "order marked paid"
                    );
                    return None;
                }
                Ok(None) => {
                    warn!(
                        reconciliation = "order_propagation_failed",
                        reference = %tx.reference,
                        order_id = %tx.order_id,
                        "paid transaction references a missing order"
                    );
                    return Some(PropagationWarning::OrderNotFound {
                        order_id: tx.order_id,
                    });
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        reference = %tx.reference,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "order update failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        reconciliation = "order_propagation_failed",
                        reference = %tx.reference,
                        order_id = %tx.order_id,
                        attempts = attempt + 1,
                        error = %e,
                        "giving up on order update; transaction stays paid"
                    );
                    return Some(PropagationWarning::OrderUpdateFailed {
                        order_id: tx.order_id,
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
