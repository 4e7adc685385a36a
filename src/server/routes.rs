//! Inbound request surface.
//!
//! The HTTP caller only ever observes accept/reject; mission outcomes are
//! visible through the audit trail alone.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::mission::MissionRequest;

/// Hands an accepted mission to the runtime. Split from the router so route
/// handlers stay testable without spawning real missions.
pub trait MissionLauncher: Send + Sync {
    fn launch(&self, request: MissionRequest);
}

#[derive(Clone)]
pub struct AppState {
    pub secret: Option<String>,
    pub launcher: Arc<dyn MissionLauncher>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/missions", post(create_mission))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct MissionPayload {
    email: String,
    secret: String,
    url: String,
}

async fn create_mission(
    State(state): State<AppState>,
    payload: Result<Json<MissionPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return bad_request(format!("malformed mission payload: {rejection}"));
        }
    };

    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return bad_request("email is not an address".to_string());
    }
    if url::Url::parse(&payload.url).is_err() {
        return bad_request(format!("url is not absolute: {}", payload.url));
    }

    match &state.secret {
        Some(secret) if *secret == payload.secret => {}
        _ => {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "invalid secret" })),
            )
                .into_response();
        }
    }

    info!(url = %payload.url, "mission accepted");
    state.launcher.launch(MissionRequest {
        email: payload.email,
        secret: payload.secret,
        url: payload.url,
    });

    (
        StatusCode::OK,
        Json(json!({ "message": "Task accepted", "status": "processing" })),
    )
        .into_response()
}

async fn healthz(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "secret_configured": state.secret.is_some(),
        })),
    )
        .into_response()
}

fn bad_request(detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": detail })),
    )
        .into_response()
}
