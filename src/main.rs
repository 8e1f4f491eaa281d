// Portal server entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use subdomain_portal::db::{self, SqliteStore};
use subdomain_portal::dns::CloudflareClient;
use subdomain_portal::web::{AppState, PortalConfig, app_routes};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often unfinished registrations are swept.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
/// Rows younger than this may still belong to an in-flight request.
const RECONCILE_MIN_AGE: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,subdomain_portal=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PortalConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(config.database_url())
        .await
        .context("Failed to open database")?;
    db::init_schema(&pool)
        .await
        .context("Failed to initialize schema")?;
    tracing::info!(url = %config.database_url(), "Database ready");

    let store = Arc::new(SqliteStore::new(pool));
    let dns = Arc::new(
        CloudflareClient::new(config.dns().clone()).context("Failed to build DNS client")?,
    );
    let state = AppState::new(&config, store, dns);

    let provisioner = state.provisioner();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = provisioner.reconcile(RECONCILE_MIN_AGE).await {
                tracing::warn!(error = %e, "Reconciliation pass failed");
            }
        }
    });

    let app = app_routes(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .context("Failed to bind to address")?;
    tracing::info!(addr = %config.listen_addr(), "Portal listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}
