use std::collections::HashMap;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::models::{LatencySample, Signal, TradeRecord};
use crate::status::{IndicatorSeries, StatusBoard};
use crate::Result;

/// Directory served under `/static` for dashboard assets.
const STATIC_DIR: &str = "static";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>crossbot</title></head>
<body>
<h1>crossbot</h1>
<ul>
<li><a href="/profit">/profit</a></li>
<li><a href="/roi">/roi</a></li>
<li><a href="/pps">/pps</a></li>
<li><a href="/trades">/trades</a></li>
<li><a href="/signals">/signals</a></li>
<li><a href="/log">/log</a></li>
<li><a href="/calctimes">/calctimes</a></li>
<li><a href="/latencies">/latencies</a></li>
<li><a href="/data">/data</a></li>
</ul>
</body>
</html>
"#;

/// Read-only dashboard over the shared status board.
pub fn router(status: StatusBoard) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/pps", get(pps))
        .route("/log", get(log))
        .route("/trades", get(trades))
        .route("/profit", get(profit))
        .route("/signals", get(signals))
        .route("/calctimes", get(calc_times))
        .route("/latencies", get(latencies))
        .route("/data", get(data))
        .route("/roi", get(roi))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(CorsLayer::permissive())
        .with_state(status)
}

pub async fn serve(status: StatusBoard, port: u16, shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    serve_with_listener(listener, status, shutdown).await
}

pub async fn serve_with_listener(
    listener: TcpListener,
    status: StatusBoard,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tracing::info!("🌐 dashboard listening on {}", listener.local_addr()?);
    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn profit(State(status): State<StatusBoard>) -> Json<f64> {
    Json(status.profit())
}

async fn roi(State(status): State<StatusBoard>) -> Json<f64> {
    Json(status.roi())
}

async fn pps(State(status): State<StatusBoard>) -> Json<f64> {
    Json(status.profit_per_second(chrono::Utc::now().timestamp_millis()))
}

async fn trades(State(status): State<StatusBoard>) -> Json<Vec<TradeRecord>> {
    Json(status.trades())
}

async fn signals(State(status): State<StatusBoard>) -> Json<Vec<Signal>> {
    Json(status.signals())
}

async fn log(State(status): State<StatusBoard>) -> Json<Vec<String>> {
    Json(status.log())
}

async fn calc_times(State(status): State<StatusBoard>) -> Json<Vec<f64>> {
    Json(status.calc_times())
}

async fn latencies(State(status): State<StatusBoard>) -> Json<Vec<LatencySample>> {
    Json(status.latencies())
}

async fn data(State(status): State<StatusBoard>) -> Json<HashMap<String, IndicatorSeries>> {
    Json(status.series())
}
