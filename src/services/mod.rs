//! Services module for business logic

pub mod payment_initiation;
pub mod reconciliation;
