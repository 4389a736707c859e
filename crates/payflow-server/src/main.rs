//! payflow HTTP Server
//!
//! Axum-based server that hosts the payment confirmation flow for the
//! platform's browser front-end.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payflow_core::{
    ControllerConfig, FilePendingPaymentStore, MemoryPendingPaymentStore, MockPlatformApi,
    PaymentController, PendingPaymentStore, PlatformApi,
};
use payflow_runtime::HttpPlatformApi;

use crate::handlers::{
    abandon_payment, confirm_payment, health_check, payment_status, retry_payment, stage_pending,
};
use crate::state::AppState;

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/payments/pending", put(stage_pending))
        .route("/api/payments/confirm", post(confirm_payment))
        .route("/api/payments/status", get(payment_status))
        .route("/api/payments/retry", post(retry_payment))
        .route("/api/payments/current", delete(abandon_payment))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ControllerConfig::from_env()?;
    tracing::info!(
        poll_interval_ms = config.poller.interval.as_millis(),
        redirect_delay_ms = config.redirect_delay.as_millis(),
        max_poll_attempts = ?config.poller.max_attempts,
        commit_policy = ?config.commit_policy,
        "Controller configured"
    );

    // Platform backend
    let api: Arc<dyn PlatformApi> = match HttpPlatformApi::from_env() {
        Ok(api) => {
            tracing::info!("✓ Platform API at {}", api.base_url());
            Arc::new(api)
        }
        Err(e) => {
            tracing::warn!("⚠ {} - using mock platform", e);
            tracing::warn!("  Set PLATFORM_API_URL in .env to reach the real backend");
            Arc::new(MockPlatformApi::new().with_settle_after(3))
        }
    };
    let platform = api.name().to_string();

    // Pending payment store
    let store: Arc<dyn PendingPaymentStore> = match std::env::var("PAYFLOW_STORE_DIR") {
        Ok(dir) => {
            let store = FilePendingPaymentStore::new(dir);
            tracing::info!("✓ Pending payments stored at {}", store.path().display());
            Arc::new(store)
        }
        Err(_) => {
            tracing::info!("Pending payments kept in memory");
            Arc::new(MemoryPendingPaymentStore::new())
        }
    };

    let controller = PaymentController::new(api, store.clone(), config);
    let app = router(AppState::new(controller, store, platform));

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 payflow server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health               - Health check");
    tracing::info!("  PUT    /api/payments/pending - Stage a pending payment");
    tracing::info!("  POST   /api/payments/confirm - Start confirmation");
    tracing::info!("  GET    /api/payments/status  - Current view");
    tracing::info!("  POST   /api/payments/retry   - Retry a failed payment");
    tracing::info!("  DELETE /api/payments/current - Abandon the current run");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
