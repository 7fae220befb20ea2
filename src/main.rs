use std::sync::Arc;

use anyhow::Context;
use storefront_payments::api::{self, AppState};
use storefront_payments::config::AppConfig;
use storefront_payments::database::repository::{OrderStore, TransactionStore};
use storefront_payments::health::HealthChecker;
use storefront_payments::logging::init_tracing;
use storefront_payments::payments::gateway::PaymentGateway;
use storefront_payments::payments::providers::PaystackGateway;
use storefront_payments::payments::signature::WebhookVerifier;
use storefront_payments::services::payment_initiation::PaymentInitiationService;
use storefront_payments::services::reconciliation::ReconciliationEngine;
use storefront_payments::workers::pending_sweeper::PendingSweeper;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

type Stores = (Arc<dyn TransactionStore>, Arc<dyn OrderStore>);

fn in_memory_stores() -> Stores {
    use storefront_payments::database::memory::{InMemoryOrderStore, InMemoryTransactionStore};
    (
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(InMemoryOrderStore::new()),
    )
}

#[cfg(feature = "database")]
async fn init_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    use storefront_payments::database::{
        init_pool_from_config, order_repository::OrderRepository,
        transaction_repository::TransactionRepository,
    };

    let Some(db_config) = config.database.as_ref() else {
        info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory stores");
        return Ok(in_memory_stores());
    };

    info!("📊 Initializing database connection pool...");
    let pool = init_pool_from_config(db_config)
        .await
        .context("failed to initialize database pool")?;
    info!(
        max_connections = db_config.max_connections,
        "✅ Database connection pool initialized"
    );
    Ok((
        Arc::new(TransactionRepository::new(pool.clone())),
        Arc::new(OrderRepository::new(pool)),
    ))
}

#[cfg(not(feature = "database"))]
async fn init_stores(_config: &AppConfig) -> anyhow::Result<Stores> {
    warn!("built without the database feature, using in-memory stores");
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        skip_externals = config.skip_externals,
        "🚀 Starting storefront payments service"
    );

    let (transactions, orders) = init_stores(&config).await?;

    let paystack = PaystackGateway::new(config.paystack.clone())
        .context("failed to initialize Paystack gateway")?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(paystack);
    let verifier = WebhookVerifier::new(config.paystack.webhook_signing_key());
    info!(provider = gateway.name(), "✅ Payment gateway initialized");

    let engine = Arc::new(ReconciliationEngine::new(
        transactions.clone(),
        orders.clone(),
        gateway.clone(),
        verifier,
        config.reconciliation.clone(),
    ));
    let initiation = Arc::new(PaymentInitiationService::new(
        transactions.clone(),
        orders.clone(),
        gateway.clone(),
        config.paystack.callback_url.clone(),
    ));
    let health_checker = HealthChecker::new(transactions.clone(), orders.clone());

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut sweeper_handle = None;
    if config.sweeper.enabled {
        info!(
            interval_secs = config.sweeper.interval.as_secs(),
            verify_after_secs = config.sweeper.verify_after.as_secs(),
            expire_after_secs = config.sweeper.expire_after.as_secs(),
            "Starting pending transaction sweeper"
        );
        let sweeper = PendingSweeper::new(
            transactions.clone(),
            gateway.clone(),
            engine.clone(),
            config.sweeper.clone(),
        );
        sweeper_handle = Some(tokio::spawn(sweeper.run(worker_shutdown_rx)));
    } else {
        info!("Pending transaction sweeper disabled (PENDING_SWEEP_ENABLED=false)");
    }

    let app = api::router(AppState {
        initiation,
        reconciliation: engine,
        health_checker,
    });
    info!("✅ Routes configured");

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await
        .context("server error")?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for sweeper shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
