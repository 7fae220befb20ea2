//! In-process stores with the same guarantees as the PostgreSQL ones.
//!
//! Used by tests and by `SKIP_EXTERNALS=true` runs. Every mutating method
//! takes the write lock for its whole check-and-write, which gives the same
//! atomicity as the single-statement SQL updates.

use crate::database::error::{DatabaseError, DatabaseResult, ONE_PAID_PER_ORDER};
use crate::database::models::{NewTransaction, Order, Transaction, TransactionStatus};
use crate::database::repository::{OrderStore, TransactionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: RwLock<HashMap<String, Transaction>>,
    writes: AtomicUsize,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, new: NewTransaction) -> DatabaseResult<Transaction> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&new.reference) {
            return Err(DatabaseError::conflict(
                "transactions_reference_key",
                format!("reference {} already exists", new.reference),
            ));
        }
        let tx = new.into_pending(Utc::now());
        rows.insert(tx.reference.clone(), tx.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(tx)
    }

    async fn find_by_reference(&self, reference: &str) -> DatabaseResult<Option<Transaction>> {
        Ok(self.rows.read().await.get(reference).cloned())
    }

    async fn set_access_code(&self, reference: &str, access_code: &str) -> DatabaseResult<()> {
        let mut rows = self.rows.write().await;
        let tx = rows
            .get_mut(reference)
            .ok_or_else(|| DatabaseError::not_found("transaction", reference))?;
        tx.access_code = Some(access_code.to_string());
        tx.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn settle_pending(
        &self,
        reference: &str,
        status: TransactionStatus,
        gateway_response: JsonValue,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<Transaction>> {
        let mut rows = self.rows.write().await;
        let order_id = match rows.get(reference) {
            Some(tx) if tx.status == TransactionStatus::Pending => tx.order_id,
            _ => return Ok(None),
        };

        if status == TransactionStatus::Paid
            && rows
                .values()
                .any(|t| t.order_id == order_id && t.status == TransactionStatus::Paid)
        {
            return Err(DatabaseError::conflict(
                ONE_PAID_PER_ORDER,
                format!("order {} already has a paid transaction", order_id),
            ));
        }

        let Some(tx) = rows.get_mut(reference) else {
            return Ok(None);
        };
        tx.status = status;
        tx.gateway_response = Some(gateway_response);
        tx.updated_at = at;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(tx.clone()))
    }

    async fn find_pending_older_than(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> DatabaseResult<Vec<Transaction>> {
        let rows = self.rows.read().await;
        let mut pending: Vec<Transaction> = rows
            .values()
            .filter(|t| t.status == TransactionStatus::Pending && t.created_at < created_before)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn has_paid_for_order(&self, order_id: Uuid) -> DatabaseResult<bool> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .any(|t| t.order_id == order_id && t.status == TransactionStatus::Paid))
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    rows: RwLock<HashMap<Uuid, Order>>,
    writes: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an order, standing in for the storefront checkout.
    pub async fn insert(&self, order: Order) {
        self.rows.write().await.insert(order.id, order);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, order_id: Uuid) -> DatabaseResult<Option<Order>> {
        Ok(self.rows.read().await.get(&order_id).cloned())
    }

    async fn mark_paid(&self, order_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<Option<Order>> {
        let mut rows = self.rows.write().await;
        let Some(order) = rows.get_mut(&order_id) else {
            return Ok(None);
        };
        order.apply_payment(at);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(order.clone()))
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        Ok(())
    }
}
