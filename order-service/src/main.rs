use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common_observability::OrderMetrics;
use reqwest::Client;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use order_service::collaborators::{Notifier, SystemClock, TracingNotifier, WebhookNotifier};
use order_service::config::GatewaySettings;
use order_service::gateway::{PaymentGateway, RazorpayGateway, StubGateway};
use order_service::ids::RandomCodes;
use order_service::store::memory::MemoryBackend;
use order_service::store::postgres::PgStore;
use order_service::{build_router, AppState, Collaborators, OrderConfig, OrderService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = OrderConfig::from_env().context("invalid order-service configuration")?;
    info!(?config, "configuration loaded");

    let http_client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway {
        GatewaySettings::Razorpay { key_id, key_secret, api_base } => {
            Arc::new(RazorpayGateway::new(http_client.clone(), api_base.clone(), key_id.clone(), key_secret.clone()))
        }
        GatewaySettings::Stub { .. } => {
            warn!("no gateway credentials configured; using the stub payment gateway");
            Arc::new(StubGateway::new())
        }
    };
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(http_client.clone(), url.clone())),
        None => Arc::new(TracingNotifier),
    };

    let deps = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let store = Arc::new(PgStore::new(pool));
            store.migrate().await.context("failed to run migrations")?;
            Collaborators {
                store: store.clone(),
                catalog: store.clone(),
                accounts: store.clone(),
                carts: store.clone(),
                coupons: store,
                gateway,
                notifier,
                clock: Arc::new(SystemClock),
                codes: Arc::new(RandomCodes),
            }
        }
        None => {
            warn!("DATABASE_URL not set; orders are kept in memory only");
            Collaborators { gateway, notifier, ..Collaborators::in_memory(&MemoryBackend::new()) }
        }
    };

    let metrics = OrderMetrics::new().context("failed to register metrics")?;
    let ip: std::net::IpAddr = config.host.parse().context("HOST must be an IP address")?;
    let addr = SocketAddr::from((ip, config.port));
    let service = OrderService::new(config, deps, metrics);
    let app = build_router(AppState::new(service));

    info!(%addr, "starting order-service");
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
