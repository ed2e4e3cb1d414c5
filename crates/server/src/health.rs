use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    relay_endpoint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub relay: HealthCheck,
    pub checked_at: String,
}

pub fn router(relay_endpoint: Option<String>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { relay_endpoint })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let relay = match state.relay_endpoint.as_deref() {
        Some(endpoint) => {
            HealthCheck { status: "ready", detail: format!("relaying to `{endpoint}`") }
        }
        None => HealthCheck {
            status: "degraded",
            detail: "AIProjectConnString is not set; relay requests will fail".to_string(),
        },
    };
    let ready = relay.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        relay,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
