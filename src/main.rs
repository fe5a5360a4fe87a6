use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trainer_billing::adapters::auth::{JwtConfig, JwtSessionValidator};
use trainer_billing::adapters::http::{build_router, BillingAppState};
use trainer_billing::adapters::postgres::{
    PostgresCustomerRegistry, PostgresMembershipLinker, PostgresPayerDirectory,
    PostgresSubscriptionLedger, PostgresTierCatalog, PostgresWebhookEventRepository,
};
use trainer_billing::adapters::stripe::{StripeBillingAdapter, StripeConfig};
use trainer_billing::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = config.database.pool_options().connect(&config.database.url).await?;
    if config.database.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    if !config.payment.is_configured() {
        tracing::warn!("Stripe credentials are not configured; billing calls will fail");
    }

    let state = billing_state(&pool, &config);
    let auth = Arc::new(JwtSessionValidator::new(JwtConfig::from_auth_config(
        &config.auth,
    )));
    let app = build_router(state, auth, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn billing_state(pool: &PgPool, config: &AppConfig) -> BillingAppState {
    BillingAppState {
        tiers: Arc::new(PostgresTierCatalog::new(pool.clone())),
        registry: Arc::new(PostgresCustomerRegistry::new(pool.clone())),
        ledger: Arc::new(PostgresSubscriptionLedger::new(pool.clone())),
        linker: Arc::new(PostgresMembershipLinker::new(pool.clone())),
        directory: Arc::new(PostgresPayerDirectory::new(pool.clone())),
        events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
        provider: Arc::new(StripeBillingAdapter::new(StripeConfig::from_payment_config(
            &config.payment,
        ))),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, stopping server");
}
