use crate::database::error::DatabaseResult;
use crate::database::models::{NewTransaction, Order, Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Durable record of payment attempts, keyed by gateway reference.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Stores a new `pending` transaction. A reused reference is a conflict.
    async fn insert(&self, new: NewTransaction) -> DatabaseResult<Transaction>;

    async fn find_by_reference(&self, reference: &str) -> DatabaseResult<Option<Transaction>>;

    /// Records the access code the gateway issued for a pending charge.
    async fn set_access_code(&self, reference: &str, access_code: &str) -> DatabaseResult<()>;

    /// Moves a transaction out of `pending` in one conditional write.
    ///
    /// Returns the updated row when this call performed the transition and
    /// `None` when the transaction was no longer pending (or does not exist).
    /// Settling `paid` while another transaction of the same order is already
    /// `paid` fails with a conflict on `ONE_PAID_PER_ORDER`.
    async fn settle_pending(
        &self,
        reference: &str,
        status: TransactionStatus,
        gateway_response: JsonValue,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<Transaction>>;

    /// Pending transactions created before `created_before`, oldest first.
    async fn find_pending_older_than(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> DatabaseResult<Vec<Transaction>>;

    async fn has_paid_for_order(&self, order_id: Uuid) -> DatabaseResult<bool>;

    async fn health_check(&self) -> DatabaseResult<()>;
}

/// Orders as far as payments are concerned. Orders themselves are created
/// by the storefront checkout.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, order_id: Uuid) -> DatabaseResult<Option<Order>>;

    /// Sets `payment_status = paid` and advances `status` from `pending` to
    /// `paid`, never touching later fulfillment states. One conditional write.
    async fn mark_paid(&self, order_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<Option<Order>>;

    async fn health_check(&self) -> DatabaseResult<()>;
}
