//! Terminal-facing HTTP surface.
//!
//! A thin adapter: bodies are decoded into [`wire`] types, the swipe goes to
//! the [`ConsumeEngine`], and the outcome or rejection is written back in the
//! shape the terminals expect. Rejections are HTTP 200 with `Status: 0`;
//! only undecodable bodies get a 400.

/// Request and reply bodies
pub mod wire;

use crate::{
    cache::CacheStore,
    core::{ConsumeEngine, SwipeRequest},
};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use wire::{ConsumeRequest, ConsumeResponse, OfflineRecord, ServerTimeReply, StatusReply};

/// Header carrying the swiping terminal's id.
pub const DEVICE_ID_HEADER: &str = "Device-ID";

/// Builds the router over a shared engine.
pub fn router<S>(engine: Arc<ConsumeEngine<S>>) -> Router
where
    S: CacheStore + 'static,
{
    Router::new()
        .route("/hxz/v1/ConsumTransactions", post(consume_transactions::<S>))
        .route("/hxz/v1/ServerTime", post(server_time::<S>))
        .route("/hxz/v1/OffLines", post(offline_records))
        .route("/api/v1/health", get(health))
        .with_state(engine)
}

fn device_id(headers: &HeaderMap) -> &str {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn bad_request(rejection: &JsonRejection) -> Response {
    warn!("Rejected terminal request body: {}", rejection.body_text());
    (
        StatusCode::BAD_REQUEST,
        Json(StatusReply::failure(format!(
            "invalid request: {}",
            rejection.body_text()
        ))),
    )
        .into_response()
}

async fn consume_transactions<S: CacheStore>(
    State(engine): State<Arc<ConsumeEngine<S>>>,
    headers: HeaderMap,
    payload: Result<Json<ConsumeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(&rejection),
    };

    let swipe = SwipeRequest {
        card_no: request.card_no,
        amount: request.amount,
    };
    match engine.consume(&swipe, device_id(&headers)).await {
        Ok(outcome) => Json(ConsumeResponse::from(outcome)).into_response(),
        Err(e) => Json(StatusReply::failure(e.terminal_message())).into_response(),
    }
}

async fn server_time<S: CacheStore>(
    State(engine): State<Arc<ConsumeEngine<S>>>,
    headers: HeaderMap,
) -> Json<ServerTimeReply> {
    let device = device_id(&headers);
    if device.is_empty() {
        warn!("Server time requested without a device id");
    }
    Json(ServerTimeReply::at(engine.now()))
}

async fn offline_records(payload: Result<Json<OfflineRecord>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(record)) => {
            info!(
                "Offline swipe from device {}: card {} at {} (order {:?})",
                record.device_number, record.card_no, record.time, record.order
            );
            Json(StatusReply::ok("ok")).into_response()
        }
        Err(rejection) => bad_request(&rejection),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "service is running" }))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
