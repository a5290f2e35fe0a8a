//! HTTP server
//!
//! Thin handlers over the [`Broker`]. Request bodies are decoded as JSON
//! whatever their `Content-Type`. A request-level problem (malformed body,
//! unknown topic) is answered with `400`. A store failure is answered with `500` and also
//! forwarded on the fatal channel, which makes the binary shut down: the
//! broker cannot keep its guarantees without the store.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broker::Broker;
use crate::broker::message::{Bot, PublishRequest};
use crate::transport::message::{ErrorResponse, StatsResponse, StatusResponse};
use crate::utils::BrokerError;

#[derive(Clone)]
pub struct AppState {
    broker: Arc<Broker>,
    fatal: UnboundedSender<BrokerError>,
}

impl AppState {
    pub fn new(broker: Arc<Broker>, fatal: UnboundedSender<BrokerError>) -> Self {
        Self { broker, fatal }
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_broker(state: &AppState, err: BrokerError) -> Self {
        let message = err.to_string();
        if err.is_fatal() {
            error!(error = %message, "fatal error while serving request");
            let _ = state.fatal.send(err);
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
            }
        } else {
            Self {
                status: StatusCode::BAD_REQUEST,
                message,
            }
        }
    }
}

/// Decodes a JSON request body, ignoring the declared content type.
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("malformed request body: {e}"),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bot", post(spawn_bot))
        .route("/unsubscribeBot", post(unsubscribe_bot))
        .route("/sensor", post(submit_sensor))
        .route("/status", get(status))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serves `router` on `listener` until `shutdown` is cancelled.
pub async fn start_http_server(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    info!(addr = ?listener.local_addr().ok(), "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn spawn_bot(State(state): State<AppState>, body: Bytes) -> Result<Json<Bot>, ApiError> {
    let bot: Bot = decode_body(&body)?;
    state
        .broker
        .register_bot(bot)
        .map(Json)
        .map_err(|e| ApiError::from_broker(&state, e))
}

async fn unsubscribe_bot(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Bot>, ApiError> {
    let bot: Bot = decode_body(&body)?;
    state
        .broker
        .unsubscribe_bot(&bot)
        .map_err(|e| ApiError::from_broker(&state, e))?;
    Ok(Json(Bot::null()))
}

async fn submit_sensor(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PublishRequest>, ApiError> {
    let request: PublishRequest = decode_body(&body)?;
    let mut echo = state
        .broker
        .accept(request)
        .map_err(|e| ApiError::from_broker(&state, e))?;
    echo.message = echo.ack_text();
    Ok(Json(echo))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let broker = &state.broker;
    let status = if broker.is_context_aware() {
        "alivectx"
    } else {
        "alive"
    };

    Json(StatusResponse {
        status: status.to_string(),
        total_bots: broker.registry().bot_count(),
        queued_requests: broker.queue().len(),
        timestamp: chrono::Utc::now(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        times_ms: state.broker.service_times().take(),
    })
}
