//! Axum-based HTTP request layer
//!
//! Thin handlers over [`ChargingEngine`]. Every route that addresses a
//! station takes `id` and `url` query parameters.

use crate::engine::ChargingEngine;
use crate::error::ChargeGateError;
use crate::status::StatusView;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChargingEngine>,
}

#[derive(Debug, Deserialize)]
pub struct StationQuery {
    pub id: String,
    pub url: String,
    /// Account that receives unspent budget
    #[serde(rename = "return")]
    pub return_account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub id: String,
    pub url: String,
    pub amps: u32,
}

fn error_response(err: ChargeGateError) -> Response {
    let status = match &err {
        ChargeGateError::Validation { .. } => StatusCode::BAD_REQUEST,
        ChargeGateError::Conflict { .. } => StatusCode::CONFLICT,
        ChargeGateError::Transport { .. }
        | ChargeGateError::Decode { .. }
        | ChargeGateError::Timeout { .. }
        | ChargeGateError::Command { .. }
        | ChargeGateError::Payment { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("APP_VERSION"),
    }))
}

async fn status(State(state): State<AppState>, Query(q): Query<StationQuery>) -> Response {
    let endpoint = match state.engine.endpoint(&q.id, &q.url) {
        Ok(ep) => ep,
        Err(e) => return error_response(e),
    };
    let report = state.engine.status(&endpoint).await;
    Json(StatusView::from(&report)).into_response()
}

async fn start(State(state): State<AppState>, Query(q): Query<StationQuery>) -> Response {
    let endpoint = match state.engine.endpoint(&q.id, &q.url) {
        Ok(ep) => ep,
        Err(e) => return error_response(e),
    };
    let return_account = q.return_account.filter(|a| !a.trim().is_empty());
    match state.engine.start_charging(&endpoint, return_account).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn stop(State(state): State<AppState>, Query(q): Query<StationQuery>) -> Response {
    let endpoint = match state.engine.endpoint(&q.id, &q.url) {
        Ok(ep) => ep,
        Err(e) => return error_response(e),
    };
    match state.engine.stop_charging(&endpoint).await {
        Ok(action) => Json(serde_json::json!({ "stop": action })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn limit(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Response {
    let endpoint = match state.engine.endpoint(&q.id, &q.url) {
        Ok(ep) => ep,
        Err(e) => return error_response(e),
    };
    match state.engine.set_current_limit(&endpoint, q.amps).await {
        Ok(()) => Json(serde_json::json!({ "amps": q.amps })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = BroadcastStream::new(state.engine.subscribe_events()).filter_map(|msg| {
        let event = msg.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<Event, std::convert::Infallible>(
            Event::default().event(event.kind()).data(data),
        ))
    });
    let settlements =
        BroadcastStream::new(state.engine.subscribe_settlements()).filter_map(|msg| {
            let outcome = msg.ok()?;
            let data = serde_json::to_string(&outcome).ok()?;
            Some(Ok::<Event, std::convert::Infallible>(
                Event::default().event("settlement").data(data),
            ))
        });
    Sse::new(sessions.merge(settlements)).keep_alive(KeepAlive::default())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/start", get(start))
        .route("/stop", get(stop))
        .route("/limit", get(limit))
        .route("/events", get(events))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` completes
pub async fn serve<F>(
    engine: Arc<ChargingEngine>,
    host: &str,
    port: u16,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(AppState { engine });
    let logger = crate::logging::get_logger("web");

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            SocketAddr::from(([127, 0, 0, 1], port))
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
