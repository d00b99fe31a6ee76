//! HTTP API
//!
//! - `POST /events/:routing_key`: enqueue a delivery (the raw body is the message)
//! - `POST /logs`: index raw transfer logs
//! - `POST /accounts`, `GET /accounts/:address`: account registry
//! - `GET /ws/balances`: published balance updates as JSON text frames
//! - `GET /health`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use reconciler::{LogStore, RawLog, TxLogRow};
use reconciler_processor::{
    Account, AccountStore, ConsumerStats, Delivery, DeliverySender, EventBus, Published,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub sender: DeliverySender,
    pub accounts: Arc<dyn AccountStore>,
    pub logs: Arc<dyn LogStore>,
    pub bus: EventBus,
    /// Cancelled on shutdown; ends open WebSocket streams.
    pub shutdown: CancellationToken,
    pub version: String,
    pub startup_time: i64,
}

impl AppState {
    pub fn new(
        sender: DeliverySender,
        accounts: Arc<dyn AccountStore>,
        logs: Arc<dyn LogStore>,
        bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sender,
            accounts,
            logs,
            bus,
            shutdown,
            version: env!("CARGO_PKG_VERSION").to_string(),
            startup_time: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub consumer: ConsumerStats,
    pub log_rows: usize,
}

#[derive(Serialize, Deserialize)]
pub struct NewAccount {
    pub address: String,
}

#[derive(Serialize, Deserialize)]
pub struct Indexed {
    pub inserted: usize,
}

/// Failure mapped to a status and a JSON `{"error": ..}` body.
struct ApiError(StatusCode, String);

impl ApiError {
    fn internal(error: &anyhow::Error) -> Self {
        tracing::error!(target: "balance_processor::http", error = ?error, "Request failed");
        Self(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let log_rows = state.logs.count().await.map_err(|e| ApiError::internal(&e))?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: chrono::Utc::now().timestamp() - state.startup_time,
        consumer: state.sender.stats(),
        log_rows,
    }))
}

async fn event_handler(
    State(state): State<AppState>,
    Path(routing_key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state
        .sender
        .send(Delivery::new(routing_key, body.to_vec()))
        .await
        .map_err(|e| ApiError(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

async fn logs_handler(
    State(state): State<AppState>,
    Json(logs): Json<Vec<RawLog>>,
) -> Result<Json<Indexed>, ApiError> {
    let rows = logs
        .iter()
        .map(TxLogRow::from_log)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|e| ApiError(StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))?;
    let inserted = state.logs.insert(&rows).await.map_err(|e| ApiError::internal(&e))?;
    Ok(Json(Indexed { inserted }))
}

async fn get_account_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Account>, ApiError> {
    state
        .accounts
        .get(&address)
        .await
        .map_err(|e| ApiError::internal(&e))?
        .map(Json)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("No account {address}")))
}

async fn create_account_handler(
    State(state): State<AppState>,
    Json(request): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    if let Some(existing) = state
        .accounts
        .get(&request.address)
        .await
        .map_err(|e| ApiError::internal(&e))?
    {
        return Ok((StatusCode::OK, Json(existing)));
    }
    let account = Account::new(&request.address);
    state
        .accounts
        .save(&account)
        .await
        .map_err(|e| ApiError::internal(&e))?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn balances_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let rx = state.bus.subscribe();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| stream_balances(socket, rx, shutdown))
}

async fn stream_balances(
    socket: WebSocket,
    rx: broadcast::Receiver<Published>,
    shutdown: CancellationToken,
) {
    let (sink, incoming) = socket.split();
    forward_balances(sink, incoming, rx, shutdown).await;
}

/// Forward published updates as text frames until the client leaves, the
/// bus closes or `shutdown` is cancelled. Shutdown sends a close frame.
async fn forward_balances<S, I, E>(
    mut sink: S,
    mut incoming: I,
    mut rx: broadcast::Receiver<Published>,
    shutdown: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    I: Stream<Item = Result<Message, E>> + Unpin,
{
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            update = rx.recv() => match update {
                Ok(published) => {
                    let text = match serde_json::to_string(&published) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(target: "balance_processor::http", error = %e, "Failed to encode balance update");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "balance_processor::http",
                        "WebSocket client lagged, skipped {} balance updates",
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(target: "balance_processor::http", "WebSocket client disconnected");
}

pub fn create_http_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/events/:routing_key", post(event_handler))
        .route("/logs", post(logs_handler))
        .route("/accounts", post(create_account_handler))
        .route("/accounts/:address", get(get_account_handler))
        .route("/ws/balances", get(balances_ws_handler))
        .with_state(state)
}
