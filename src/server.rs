//! HTTP surface: the OpenAI-compatible completion endpoint plus read-only catalog views.

use crate::auth::{ApiKeyAuth, require_api_key};
use crate::catalog::{Agent, Model};
use crate::chat::ChatRequest;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub auth: ApiKeyAuth,
}

/// `/v1` and `/api` sit behind the shared key; `/health` stays open.
pub fn router(state: AppState) -> Router {
    let protected: Router<AppState> = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/api/active-models", get(active_models))
        .route("/api/active-agents", get(active_agents))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        addr = %listener.local_addr()?,
        auth = state.auth.is_enabled(),
        "agent-relay listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Upstream {
                status,
                content_type,
                body,
            } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                let content_type = content_type
                    .and_then(|ct| HeaderValue::from_str(&ct).ok())
                    .unwrap_or(HeaderValue::from_static("application/json"));
                (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
            }
            Error::ModelNotFound(_) => error_body(StatusCode::NOT_FOUND, self.to_string()),
            other => {
                error!(error = %other, "request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn health_check() -> &'static str {
    "ok"
}

async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, format!("invalid request body: {e}")),
    };
    match state.dispatcher.dispatch(&request).await {
        Ok(relay) => relay.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let models = state.dispatcher.store().list_models(false).await?;
    let data: Vec<_> = models
        .iter()
        .map(|m| json!({ "id": m.id, "object": "model", "owned_by": "agent-relay" }))
        .collect();
    Ok(Json(json!({ "object": "list", "data": data })))
}

async fn active_models(State(state): State<AppState>) -> Result<Json<Vec<Model>>, Error> {
    Ok(Json(state.dispatcher.store().list_models(false).await?))
}

async fn active_agents(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, Error> {
    Ok(Json(state.dispatcher.store().list_agents(false).await?))
}
