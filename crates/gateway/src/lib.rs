//! HTTP boundary for the agent loop.
//!
//! - `POST /prompt` : admit a prompt and run it in the background
//! - `POST /cancel` : cancel the running prompt, if any
//! - `GET  /events` : SSE stream of domain events
//! - `GET  /health` : liveness probe
//!
//! Built on Axum. Prompt progress is only visible through `/events`.

mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use harness_agent::AgentLoop;
use harness_core::event::{AgentStatus, EventBroadcaster, EventKind};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    pub events: EventBroadcaster,
    /// Keep-alive interval for `/events`.
    pub heartbeat: Duration,
    /// Parent of every prompt's cancellation token; fired on shutdown.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    /// `events` must be the broadcaster the agent reports to, directly or
    /// through a wrapping listener.
    pub fn new(agent: Arc<AgentLoop>, events: EventBroadcaster, heartbeat: Duration) -> Self {
        Self {
            agent,
            events,
            heartbeat,
            shutdown: CancellationToken::new(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/prompt", post(prompt_handler))
        .route("/cancel", post(cancel_handler))
        .route("/events", get(sse::events_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C, SIGTERM or `state.shutdown` fires.
///
/// On the way out the running prompt is cancelled and every event stream is
/// closed so open connections can drain.
pub async fn serve(state: SharedState, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway listening");

    let app = build_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(drain(state))
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn drain(state: SharedState) {
    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        _ = state.shutdown.cancelled() => info!("Shutdown requested"),
    }
    state.shutdown.cancel();
    state.agent.cancel();
    state.events.close();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// --- Handlers ---

#[derive(Deserialize)]
struct PromptRequest {
    content: String,
}

fn reject(status: StatusCode, path: &str, reason: &'static str) -> Response {
    warn!(path, status = status.as_u16(), error = reason, "Request validation failed");
    (status, reason).into_response()
}

async fn prompt_handler(
    State(state): State<SharedState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Response {
    let content = match payload {
        Ok(Json(req)) => req.content,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed prompt payload");
            return reject(StatusCode::BAD_REQUEST, "/prompt", "invalid request body");
        }
    };
    if content.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "/prompt", "content is required");
    }

    let permit = match state.agent.admit(&content, &state.shutdown) {
        Ok(permit) => permit,
        Err(_) => {
            return reject(
                StatusCode::CONFLICT,
                "/prompt",
                "another prompt is already in progress",
            );
        }
    };
    info!(content_len = content.len(), "Prompt accepted");

    let agent = state.agent.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        events.publish(EventKind::status(AgentStatus::Thinking));
        let result = agent.run(&permit, content).await;
        match result {
            Ok(_) => {
                events.publish(EventKind::status(AgentStatus::Idle));
            }
            Err(e) => {
                events.publish(EventKind::Status {
                    state: AgentStatus::Error,
                    message: Some(e.to_string()),
                });
            }
        }
        drop(permit);
    });

    StatusCode::OK.into_response()
}

async fn cancel_handler(State(state): State<SharedState>) -> StatusCode {
    let was_running = state.agent.cancel();
    info!(was_running, "Cancel requested");
    StatusCode::OK
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
