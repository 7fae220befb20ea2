//! Health check module
//! Provides health status for the application and its stores

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, warn};

use crate::database::error::DatabaseResult;
use crate::database::repository::{OrderStore, TransactionStore};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const SLOW_CHECK_MS: u128 = 1000;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }

    fn record(&mut self, name: &str, health: ComponentHealth) {
        match health.status {
            ComponentState::Down => self.status = HealthState::Unhealthy,
            ComponentState::Warning if self.status == HealthState::Healthy => {
                self.status = HealthState::Degraded
            }
            _ => {}
        }
        self.checks.insert(name.to_string(), health);
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    transactions: Arc<dyn TransactionStore>,
    orders: Arc<dyn OrderStore>,
}

impl HealthChecker {
    pub fn new(transactions: Arc<dyn TransactionStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self {
            transactions,
            orders,
        }
    }

    /// Checks both stores, each bounded by a timeout.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        health_status.record(
            "transactions",
            check_component("transactions", self.transactions.health_check()).await,
        );
        health_status.record(
            "orders",
            check_component("orders", self.orders.health_check()).await,
        );
        health_status
    }
}

async fn check_component<F>(name: &str, check: F) -> ComponentHealth
where
    F: Future<Output = DatabaseResult<()>>,
{
    let start = Instant::now();
    match timeout(CHECK_TIMEOUT, check).await {
        Ok(Ok(())) => {
            let elapsed = start.elapsed().as_millis();
            if elapsed > SLOW_CHECK_MS {
                warn!(component = name, elapsed_ms = elapsed as u64, "slow health check");
                ComponentHealth::warning(Some(elapsed), Some("Slow response".to_string()))
            } else {
                ComponentHealth::up(Some(elapsed))
            }
        }
        Ok(Err(e)) => {
            error!(component = name, error = %e, "health check failed");
            ComponentHealth::down(Some(e.to_string()))
        }
        Err(_) => {
            error!(component = name, "health check timed out");
            ComponentHealth::down(Some("Timeout".to_string()))
        }
    }
}
