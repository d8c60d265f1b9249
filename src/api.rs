use std::{future::Future, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::health::HealthChecker,
    models::{
        dispatch::PairOutcome,
        health::HealthStatus,
        instruction::Environment,
        request::PairRequest,
        response::ApiResponse,
    },
    services::{
        correlation::CorrelationStore, dispatcher::OutboundDispatcher,
        message_builder::MessageBuilder, poller::QueueStateRegistry,
    },
};

pub struct AppState {
    pub health_checker: HealthChecker,
    pub registry: Arc<QueueStateRegistry>,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub store: Arc<CorrelationStore>,
    pub builder: MessageBuilder,
    pub outbound_queue_name: String,
    pub default_environment: Environment,
}

#[derive(Debug, Deserialize)]
pub struct DispatchPairBody {
    #[serde(flatten)]
    pub request: PairRequest,
    pub template_name: Option<String>,
    pub queue_name: Option<String>,
    pub environment: Option<Environment>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/pollers", get(list_pollers))
        .route("/api/v1/pollers/{queue}/start", post(start_poller))
        .route("/api/v1/pollers/{queue}/stop", post(stop_poller))
        .route("/api/v1/pairs", post(dispatch_pair))
        .route("/api/v1/pairs/{correlation_key}", get(get_pair))
        .route(
            "/api/v1/instructions/{transaction_id}/resend",
            post(resend_leg),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server<F>(state: Arc<AppState>, port: u16, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Operational API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn error_response(status: StatusCode, error: Error, message: &str) -> Response {
    (
        status,
        Json(ApiResponse::<()>::failure(error, message)),
    )
        .into_response()
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn list_pollers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(
        state.registry.snapshot(),
        "Status pollers",
    ))
}

async fn start_poller(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
) -> Response {
    match state.registry.start(&queue) {
        Ok(started) => {
            let message = if started {
                format!("Poller for {} started", queue)
            } else {
                format!("Poller for {} already running", queue)
            };
            Json(ApiResponse::ok(state.registry.snapshot(), message)).into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e, "Unknown status queue"),
    }
}

async fn stop_poller(
    State(state): State<Arc<AppState>>,
    Path(queue): Path<String>,
) -> Response {
    match state.registry.stop(&queue) {
        Ok(stopped) => {
            let message = if stopped {
                format!("Poller for {} stopped", queue)
            } else {
                format!("Poller for {} already stopped", queue)
            };
            Json(ApiResponse::ok(state.registry.snapshot(), message)).into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e, "Unknown status queue"),
    }
}

async fn dispatch_pair(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DispatchPairBody>,
) -> Response {
    let pair = match state.builder.build_pair(&body.request) {
        Ok(pair) => pair,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e, "Invalid pair request"),
    };

    let template_name = body
        .template_name
        .unwrap_or_else(|| body.request.kind.default_template().to_string());
    let queue_name = body
        .queue_name
        .unwrap_or_else(|| state.outbound_queue_name.clone());
    let environment = body.environment.unwrap_or(state.default_environment);

    match state
        .dispatcher
        .dispatch_pair(&template_name, &queue_name, environment, &pair)
        .await
    {
        Ok(result) => {
            let outcome = result.outcome();
            let status = match outcome {
                PairOutcome::Success => StatusCode::OK,
                PairOutcome::PartialFailure | PairOutcome::TotalFailure => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(ApiResponse::ok(result, outcome.to_string())),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Pair dispatch rejected");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e, "Pair dispatch failed")
        }
    }
}

async fn get_pair(
    State(state): State<Arc<AppState>>,
    Path(correlation_key): Path<String>,
) -> Response {
    match state.store.find_pair(&correlation_key).await {
        Ok(legs) if legs.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::failure(
                format!("No instructions for {}", correlation_key),
                "Pair not found",
            )),
        )
            .into_response(),
        Ok(legs) => Json(ApiResponse::ok(legs, "Pair found")).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e, "Lookup failed"),
    }
}

async fn resend_leg(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Response {
    match state.dispatcher.resend_leg(&transaction_id).await {
        Ok(result) => {
            let status = if result.sent() {
                StatusCode::OK
            } else {
                StatusCode::BAD_GATEWAY
            };
            let message = result.send_status.to_string();
            (status, Json(ApiResponse::ok(result, message))).into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e, "Resend failed"),
    }
}
