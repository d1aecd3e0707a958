use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{Method, header};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::market_data::refresher::RefreshHandle;
use crate::state::snapshot::MarketSnapshot;
use crate::telemetry;

/// Serves the snapshot JSON to the browser front end.
/// Blocks until the listener fails.
pub async fn start_server(addr: SocketAddr, refresh: RefreshHandle) -> anyhow::Result<()> {
    let app = build_app(refresh);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "webserver listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_app(refresh: RefreshHandle) -> Router {
    // The comparison page may be hosted anywhere; any origin can read the
    // data. The layer also answers OPTIONS preflights.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/market-data", get(market_data))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(refresh)
}

/// Refresh-if-stale, then serve whatever we have. Always 200; on upstream
/// trouble the body is simply the last-known-good snapshot.
async fn market_data(State(refresh): State<RefreshHandle>) -> Json<MarketSnapshot> {
    let snapshot = refresh.fresh_snapshot().await;
    telemetry::record_snapshot_served();
    Json(snapshot)
}

async fn healthz() -> &'static str {
    "ok"
}
