use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{parse_bool_var, parse_var, ConfigError};
use crate::database::models::{Transaction, TransactionStatus};
use crate::database::repository::TransactionStore;
use crate::payments::gateway::PaymentGateway;
use crate::services::reconciliation::{ReconcileError, ReconcileOutcome, ReconciliationEngine};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("database error: {0}")]
    Database(#[from] crate::database::error::DatabaseError),

    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// How often the worker wakes up.
    pub interval: Duration,
    /// Minimum age before a pending transaction is re-verified with the gateway.
    pub verify_after: Duration,
    /// Age after which a transaction the gateway still reports as pending
    /// (or does not know) is marked `failed`.
    pub expire_after: Duration,
    /// Maximum pending transactions examined per cycle.
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            verify_after: Duration::from_secs(15 * 60),
            expire_after: Duration::from_secs(24 * 60 * 60),
            batch_size: 100,
        }
    }
}

impl SweeperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_bool_var("PENDING_SWEEP_ENABLED", defaults.enabled)?,
            interval: Duration::from_secs(parse_var(
                "PENDING_SWEEP_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            verify_after: Duration::from_secs(parse_var(
                "PENDING_VERIFY_AFTER_SECS",
                defaults.verify_after.as_secs(),
            )?),
            expire_after: Duration::from_secs(parse_var(
                "PENDING_EXPIRE_AFTER_SECS",
                defaults.expire_after.as_secs(),
            )?),
            batch_size: parse_var("PENDING_SWEEP_BATCH_SIZE", defaults.batch_size)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PENDING_SWEEP_INTERVAL_SECS".to_string(),
            ));
        }
        if self.batch_size <= 0 {
            return Err(ConfigError::InvalidValue(
                "PENDING_SWEEP_BATCH_SIZE".to_string(),
            ));
        }
        if self.expire_after < self.verify_after {
            return Err(ConfigError::ValidationFailed(
                "PENDING_EXPIRE_AFTER_SECS must be >= PENDING_VERIFY_AFTER_SECS".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Counts from one sweep cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub paid: usize,
    pub failed: usize,
    pub expired: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Re-verifies transactions whose webhook never arrived and expires the
/// ones the gateway never completed.
pub struct PendingSweeper {
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    engine: Arc<ReconciliationEngine>,
    config: SweeperConfig,
}

impl PendingSweeper {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        engine: Arc<ReconciliationEngine>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            transactions,
            gateway,
            engine,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            verify_after_secs = self.config.verify_after.as_secs(),
            expire_after_secs = self.config.expire_after.as_secs(),
            batch_size = self.config.batch_size,
            "pending transaction sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending transaction sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    match self.run_cycle().await {
                        Ok(report) if report.checked > 0 => {
                            info!(?report, "pending sweep finished");
                        }
                        Ok(_) => debug!("no stale pending transactions"),
                        Err(e) => warn!(error = %e, "pending sweep cycle failed"),
                    }
                }
            }
        }

        info!("pending transaction sweeper stopped");
    }

    pub async fn run_cycle(&self) -> Result<SweepReport, SweepError> {
        self.sweep(Utc::now()).await
    }

    /// One pass over stale pending transactions as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let created_before = now - chrono_duration(self.config.verify_after);
        let stale = self
            .transactions
            .find_pending_older_than(created_before, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for tx in stale {
            report.checked += 1;
            let reference = tx.reference.clone();
            if let Err(e) = self.sweep_one(tx, now, &mut report).await {
                report.errors += 1;
                warn!(reference = %reference, error = %e, "failed to reconcile pending transaction");
            }
        }
        Ok(report)
    }

    async fn sweep_one(
        &self,
        tx: Transaction,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        let expired = now - tx.created_at >= chrono_duration(self.config.expire_after);

        let status = match self.gateway.verify_charge(&tx.reference).await {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                // Unreachable gateway: never expire on a guess.
                warn!(reference = %tx.reference, error = %e, "gateway unavailable, leaving transaction pending");
                report.errors += 1;
                return Ok(());
            }
            Err(e) => {
                // The gateway rejected the lookup, typically because the
                // charge was never initialized there.
                debug!(reference = %tx.reference, error = %e, "gateway has no usable record of charge");
                return self.expire_or_wait(&tx, expired, report).await;
            }
        };

        if !status.state.is_final() {
            debug!(reference = %tx.reference, state = ?status.state, "charge still open at gateway");
            return self.expire_or_wait(&tx, expired, report).await;
        }

        let outcome = self.engine.apply_charge_status(tx, status).await?;
        tally(&outcome, report, false);
        Ok(())
    }

    async fn expire_or_wait(
        &self,
        tx: &Transaction,
        expired: bool,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        if !expired {
            report.still_pending += 1;
            return Ok(());
        }
        let outcome = self.engine.expire(tx).await?;
        tally(&outcome, report, true);
        Ok(())
    }
}

fn tally(outcome: &ReconcileOutcome, report: &mut SweepReport, expiry: bool) {
    match outcome {
        ReconcileOutcome::Applied {
            status: TransactionStatus::Paid,
            ..
        } => report.paid += 1,
        ReconcileOutcome::Applied { .. } if expiry => report.expired += 1,
        ReconcileOutcome::Applied { .. } => report.failed += 1,
        ReconcileOutcome::Ignored { .. } => report.still_pending += 1,
        ReconcileOutcome::Duplicate { .. } => {}
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{InMemoryOrderStore, InMemoryTransactionStore};
    use crate::database::models::{NewTransaction, Order, OrderStatus, PaymentStatus};
    use crate::database::repository::OrderStore;
    use crate::payments::error::{PaymentError, PaymentResult};
    use crate::payments::signature::WebhookVerifier;
    use crate::payments::types::{
        ChargeAuthorization, ChargeRequest, ChargeStatus, GatewayState, WebhookEvent,
    };
    use crate::services::reconciliation::ReconciliationConfig;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::collections::HashMap;

    /// Gateway whose verify endpoint answers from a fixed table.
    struct ScriptedGateway {
        answers: HashMap<String, Result<GatewayState, PaymentError>>,
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        fn name(&self) -> &'static str {
            "paystack"
        }

        async fn create_charge(&self, _request: ChargeRequest) -> PaymentResult<ChargeAuthorization> {
            unreachable!("sweeper never creates charges")
        }

        async fn verify_charge(&self, reference: &str) -> PaymentResult<ChargeStatus> {
            let state = self
                .answers
                .get(reference)
                .cloned()
                .unwrap_or(Ok(GatewayState::Pending))?;
            Ok(ChargeStatus {
                reference: reference.to_string(),
                state,
                amount_minor: Some(500000),
                currency: Some("NGN".to_string()),
                gateway_response: None,
                raw: serde_json::json!({ "reference": reference }),
            })
        }

        fn signature_header(&self) -> &'static str {
            "x-paystack-signature"
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            unreachable!("sweeper never parses webhooks")
        }
    }

    struct Fixture {
        sweeper: PendingSweeper,
        transactions: Arc<InMemoryTransactionStore>,
        orders: Arc<InMemoryOrderStore>,
        order: Order,
    }

    async fn fixture(answers: Vec<(&str, Result<GatewayState, PaymentError>)>) -> Fixture {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let orders = Arc::new(InMemoryOrderStore::new());
        let order = Order::new(uuid::Uuid::new_v4(), "ORD-7", BigDecimal::from(5000), "NGN");
        orders.insert(order.clone()).await;

        for (reference, _) in &answers {
            transactions
                .insert(NewTransaction {
                    reference: reference.to_string(),
                    order_id: order.id,
                    store_id: order.store_id,
                    amount: BigDecimal::from(5000),
                    currency: "NGN".to_string(),
                    provider: "paystack".to_string(),
                })
                .await
                .unwrap();
        }

        let gateway: Arc<dyn PaymentGateway> = Arc::new(ScriptedGateway {
            answers: answers
                .into_iter()
                .map(|(r, a)| (r.to_string(), a))
                .collect(),
        });
        let engine = Arc::new(ReconciliationEngine::new(
            transactions.clone(),
            orders.clone(),
            gateway.clone(),
            WebhookVerifier::new("sk_test"),
            ReconciliationConfig::default(),
        ));
        let sweeper = PendingSweeper::new(
            transactions.clone(),
            gateway,
            engine,
            SweeperConfig::default(),
        );
        Fixture {
            sweeper,
            transactions,
            orders,
            order,
        }
    }

    async fn status_of(store: &InMemoryTransactionStore, reference: &str) -> TransactionStatus {
        store
            .find_by_reference(reference)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn fresh_transactions_are_left_alone() {
        let f = fixture(vec![("ref-a", Ok(GatewayState::Success))]).await;
        let report = f.sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn verified_success_settles_through_the_engine() {
        let f = fixture(vec![
            ("ref-a", Ok(GatewayState::Success)),
            ("ref-b", Ok(GatewayState::Failed)),
        ])
        .await;
        let report = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.paid, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Paid);
        assert_eq!(status_of(&f.transactions, "ref-b").await, TransactionStatus::Failed);

        let order = f.orders.find_by_id(f.order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn pending_at_gateway_expires_only_after_window() {
        let f = fixture(vec![("ref-a", Ok(GatewayState::Pending))]).await;

        let early = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(early.still_pending, 1);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Pending);

        let late = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(late.expired, 1);
        let tx = f.transactions.find_by_reference("ref-a").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.gateway_response, Some(serde_json::json!({"reason": "expired"})));
    }

    #[tokio::test]
    async fn abandoned_checkout_stays_pending_until_expiry() {
        let f = fixture(vec![
            ("ref-a", Ok(GatewayState::Abandoned)),
            ("ref-b", Ok(GatewayState::Unknown)),
        ])
        .await;

        let early = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(early.still_pending, 2);
        assert_eq!(early.failed, 0);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Pending);
        assert_eq!(status_of(&f.transactions, "ref-b").await, TransactionStatus::Pending);

        let late = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(late.expired, 2);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn unreachable_gateway_never_expires() {
        let f = fixture(vec![(
            "ref-a",
            Err(PaymentError::NetworkError {
                message: "connection refused".to_string(),
            }),
        )])
        .await;
        let report = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn charge_unknown_to_gateway_expires_after_window() {
        let f = fixture(vec![(
            "ref-a",
            Err(PaymentError::ProviderError {
                provider: "paystack".to_string(),
                message: "Transaction reference not found".to_string(),
                provider_code: None,
                retryable: false,
            }),
        )])
        .await;
        let report = f
            .sweeper
            .sweep(Utc::now() + chrono::Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(status_of(&f.transactions, "ref-a").await, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let f = fixture(vec![]).await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(f.sweeper.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[test]
    fn config_rejects_expiry_shorter_than_verify_window() {
        let config = SweeperConfig {
            verify_after: Duration::from_secs(3600),
            expire_after: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SweeperConfig::default().validate().is_ok());
    }
}
