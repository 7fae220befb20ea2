use crate::database::error::DatabaseError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a payment attempt. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(TransactionStatus::Pending),
            "paid" => Ok(TransactionStatus::Paid),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DatabaseError::corrupt(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// Commercial fulfillment state of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Status after a confirmed payment. Only `pending` advances; later
    /// fulfillment states and cancellations are left alone.
    pub fn after_payment(self) -> OrderStatus {
        match self {
            OrderStatus::Pending => OrderStatus::Paid,
            other => other,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DatabaseError::corrupt(format!(
                "unknown order status: {}",
                other
            ))),
        }
    }
}

/// Financial state of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DatabaseError::corrupt(format!(
                "unknown payment status: {}",
                other
            ))),
        }
    }
}

/// A payment attempt against one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub order_id: Uuid,
    pub store_id: Uuid,
    /// Major units; see `payments::money` for the gateway's minor units.
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub provider: String,
    pub access_code: Option<String>,
    /// Raw payload of the last provider event that touched this record.
    pub gateway_response: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a payment attempt starts. Always stored `pending`.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub order_id: Uuid,
    pub store_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider: String,
}

impl NewTransaction {
    pub fn into_pending(self, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            reference: self.reference,
            order_id: self.order_id,
            store_id: self.store_id,
            amount: self.amount,
            currency: self.currency,
            status: TransactionStatus::Pending,
            provider: self.provider,
            access_code: None,
            gateway_response: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub store_id: Uuid,
    pub order_number: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh unpaid order, as the storefront checkout creates it.
    pub fn new(store_id: Uuid, order_number: &str, total_amount: BigDecimal, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            store_id,
            order_number: order_number.to_string(),
            total_amount,
            currency: currency.to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a confirmed payment without regressing fulfillment.
    pub fn apply_payment(&mut self, now: DateTime<Utc>) {
        self.payment_status = PaymentStatus::Paid;
        self.status = self.status.after_payment();
        self.updated_at = now;
    }
}
