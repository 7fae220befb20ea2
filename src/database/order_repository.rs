use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::models::{Order, OrderStatus, PaymentStatus};
use crate::database::repository::OrderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const COLUMNS: &str = "id, store_id, order_number, total_amount, currency, status, \
                       payment_status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    store_id: Uuid,
    order_number: String,
    total_amount: BigDecimal,
    currency: String,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            store_id: row.store_id,
            order_number: row.order_number,
            total_amount: row.total_amount,
            currency: row.currency,
            status: OrderStatus::from_str(&row.status)?,
            payment_status: PaymentStatus::from_str(&row.payment_status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed view of storefront orders.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_by_id(&self, order_id: Uuid) -> DatabaseResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", COLUMNS))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn mark_paid(&self, order_id: Uuid, at: DateTime<Utc>) -> DatabaseResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders
             SET payment_status = 'paid',
                 status = CASE WHEN status = 'pending' THEN 'paid' ELSE status END,
                 updated_at = $2
             WHERE id = $1
             RETURNING {}",
            COLUMNS
        ))
        .bind(order_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .map(Order::try_from)
        .transpose()
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        crate::database::health_check(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_order(pool: &PgPool, store_id: Uuid, order_number: &str) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO orders (id, store_id, order_number, total_amount, currency)
             VALUES ($1, $2, $3, 100, 'NGN')",
        )
        .bind(id)
        .bind(store_id)
        .bind(order_number)
        .execute(pool)
        .await?;
        Ok(id)
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn order_numbers_are_unique_per_store() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/storefront_test".to_string());
        let pool = crate::database::init_pool(&url, None).await.unwrap();
        let order_number = format!("ORD-{}", Uuid::new_v4().simple());
        let store_a = Uuid::new_v4();
        let store_b = Uuid::new_v4();

        let a = insert_order(&pool, store_a, &order_number).await.unwrap();
        let b = insert_order(&pool, store_b, &order_number).await.unwrap();

        let repo = OrderRepository::new(pool.clone());
        assert_eq!(repo.find_by_id(a).await.unwrap().unwrap().store_id, store_a);
        assert_eq!(repo.find_by_id(b).await.unwrap().unwrap().store_id, store_b);

        let err = DatabaseError::from_sqlx(
            insert_order(&pool, store_a, &order_number).await.unwrap_err(),
        );
        assert!(err.is_conflict_on("orders_store_order_number_key"));
    }
}
