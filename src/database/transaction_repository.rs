use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::models::{NewTransaction, Transaction, TransactionStatus};
use crate::database::repository::TransactionStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, reference, order_id, store_id, amount, currency, status, provider, \
                       access_code, gateway_response, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    order_id: Uuid,
    store_id: Uuid,
    amount: BigDecimal,
    currency: String,
    status: String,
    provider: String,
    access_code: Option<String>,
    gateway_response: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            reference: row.reference,
            order_id: row.order_id,
            store_id: row.store_id,
            amount: row.amount,
            currency: row.currency,
            status: TransactionStatus::from_str(&row.status)?,
            provider: row.provider,
            access_code: row.access_code,
            gateway_response: row.gateway_response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed transaction store.
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn insert(&self, new: NewTransaction) -> DatabaseResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO transactions
             (id, reference, order_id, store_id, amount, currency, status, provider)
             VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
             RETURNING {}",
            COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.reference)
        .bind(new.order_id)
        .bind(new.store_id)
        .bind(&new.amount)
        .bind(&new.currency)
        .bind(&new.provider)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.try_into()
    }

    async fn find_by_reference(&self, reference: &str) -> DatabaseResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE reference = $1",
            COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Transaction::try_from)
        .transpose()
    }

    async fn set_access_code(&self, reference: &str, access_code: &str) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET access_code = $2, updated_at = NOW() WHERE reference = $1",
        )
        .bind(reference)
        .bind(access_code)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("transaction", reference));
        }
        Ok(())
    }

    async fn settle_pending(
        &self,
        reference: &str,
        status: TransactionStatus,
        gateway_response: JsonValue,
        at: DateTime<Utc>,
    ) -> DatabaseResult<Option<Transaction>> {
        // The status predicate makes this a compare-and-set: concurrent
        // deliveries serialise on the row lock and only the first sees 'pending'.
        let result = sqlx::query_as::<_, TransactionRow>(&format!(
            "UPDATE transactions
             SET status = $2, gateway_response = $3, updated_at = $4
             WHERE reference = $1 AND status = 'pending'
             RETURNING {}",
            COLUMNS
        ))
        .bind(reference)
        .bind(status.as_str())
        .bind(&gateway_response)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        result.map(Transaction::try_from).transpose()
    }

    async fn find_pending_older_than(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> DatabaseResult<Vec<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions
             WHERE status = 'pending' AND created_at < $1
             ORDER BY created_at ASC
             LIMIT $2",
            COLUMNS
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
    }

    async fn has_paid_for_order(&self, order_id: Uuid) -> DatabaseResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE order_id = $1 AND status = 'paid')",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(exists)
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        crate::database::health_check(&self.pool).await
    }
}
