//! HTTP relay in front of a hosted agent.
//!
//! `GET|POST /api/agent_httptrigger` forwards one message to an agent and
//! answers with the newest assistant reply as a JSON string. Inputs may come
//! from the query string or a JSON body; a non-empty query value wins.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use exempt_agent::{AgentRuntime, RelayError};
use exempt_core::config::RELAY_ENDPOINT_ENV;
use exempt_core::{AgentId, ApplicationError, InterfaceError, ThreadId};
use serde::Deserialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const RELAY_ROUTE: &str = "/api/agent_httptrigger";
pub const THREAD_ID_HEADER: &str = "x-thread-id";

const MISSING_INPUT: &str =
    "Pass in a message and agentid in the query string or in the request body for a personalized response.";

#[derive(Clone)]
pub struct RelayState {
    /// `None` when the relay endpoint is not configured.
    runtime: Option<AgentRuntime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelayParams {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub agentid: Option<String>,
    #[serde(default)]
    pub threadid: Option<String>,
}

impl RelayParams {
    /// Builds params from raw query pairs; the first occurrence of a key wins.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "message" => &mut params.message,
                "agentid" => &mut params.agentid,
                "threadid" => &mut params.threadid,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RelayRequest {
    message: String,
    agent_id: AgentId,
    thread_id: Option<ThreadId>,
}

pub fn router(runtime: Option<AgentRuntime>) -> Router {
    Router::new()
        .route(RELAY_ROUTE, get(agent_httptrigger).post(agent_httptrigger))
        .with_state(RelayState { runtime })
}

pub async fn agent_httptrigger(
    State(state): State<RelayState>,
    Query(pairs): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let query = RelayParams::from_pairs(pairs);
    let correlation_id = Uuid::new_v4().to_string();
    let span = info_span!("relay.request", correlation_id = %correlation_id);

    async move {
        match relay(&state, query, &body, &correlation_id).await {
            Ok(response) => response,
            Err(error) => interface_response(error),
        }
    }
    .instrument(span)
    .await
}

async fn relay(
    state: &RelayState,
    query: RelayParams,
    body: &[u8],
    correlation_id: &str,
) -> Result<Response, InterfaceError> {
    let request = merge_inputs(query, parse_body(body)).ok_or_else(|| {
        ApplicationError::InvalidInput(MISSING_INPUT.to_string()).into_interface(correlation_id)
    })?;

    let Some(runtime) = state.runtime.as_ref() else {
        return Err(InterfaceError::Internal {
            message: format!("Missing {RELAY_ENDPOINT_ENV}."),
            correlation_id: correlation_id.to_string(),
        });
    };

    info!(
        event_name = "relay.request.accepted",
        agent_id = %request.agent_id,
        thread_id = request.thread_id.as_ref().map(ThreadId::as_str).unwrap_or("new"),
        "relaying message to agent"
    );

    let conversation = runtime
        .converse(&request.agent_id, request.thread_id, &request.message)
        .await
        .map_err(|relay_error| {
            if let RelayError::Platform(source) = &relay_error {
                error!(
                    event_name = "relay.request.failed",
                    agent_id = %request.agent_id,
                    error = %error_chain(source),
                    "agent conversation failed"
                );
            }
            ApplicationError::from(relay_error).into_interface(correlation_id)
        })?;

    info!(
        event_name = "relay.request.completed",
        agent_id = %request.agent_id,
        thread_id = %conversation.thread_id,
        run_status = conversation.run_status.as_str(),
        "relayed agent reply"
    );

    let mut response = (StatusCode::OK, Json(conversation.reply)).into_response();
    if let Ok(value) = HeaderValue::from_str(conversation.thread_id.as_str()) {
        response.headers_mut().insert(THREAD_ID_HEADER, value);
    }
    Ok(response)
}

// An unreadable body counts as no body at all.
fn parse_body(body: &[u8]) -> Option<RelayParams> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

fn merge_inputs(query: RelayParams, body: Option<RelayParams>) -> Option<RelayRequest> {
    let body = body.unwrap_or_default();
    let message = prefer_query(query.message, body.message)?;
    let agent_id = prefer_query(query.agentid, body.agentid)?;
    let thread_id = prefer_query(query.threadid, body.threadid);

    Some(RelayRequest { message, agent_id: AgentId(agent_id), thread_id: thread_id.map(ThreadId) })
}

fn prefer_query(query: Option<String>, body: Option<String>) -> Option<String> {
    query.filter(|value| !value.is_empty()).or_else(|| body.filter(|value| !value.is_empty()))
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn interface_response(error: InterfaceError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match &error {
        InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
            warn!(
                event_name = "relay.request.rejected",
                status = status.as_u16(),
                correlation_id = error.correlation_id(),
                "{message}"
            );
            message.clone()
        }
        InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "relay.request.error",
                correlation_id = error.correlation_id(),
                "{message}"
            );
            format!("Internal Server Error: {message}")
        }
    };
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use exempt_agent::{AgentRuntime, AgentsClient, InMemoryAgentsClient};
    use exempt_core::{AgentDefinition, AgentId};
    use serde_json::json;
    use tower::ServiceExt;

    use super::{merge_inputs, router, RelayParams, RELAY_ROUTE, THREAD_ID_HEADER};

    struct Reply {
        status: StatusCode,
        thread_id: Option<String>,
        content_type: Option<String>,
        body: String,
    }

    async fn relay_with_agent() -> (Router, Arc<InMemoryAgentsClient>, AgentId) {
        let client = Arc::new(InMemoryAgentsClient::new());
        let agent = client
            .create_agent(&AgentDefinition {
                model: "gpt-4o-mini".to_string(),
                name: "Azure Policy Exemptions Agent".to_string(),
                instructions: "answer".to_string(),
                tools: Vec::new(),
            })
            .await
            .expect("agent");
        (router(Some(AgentRuntime::new(client.clone()))), client, agent.id)
    }

    async fn send(app: Router, request: Request<Body>) -> Reply {
        let response = app.oneshot(request).await.expect("router responds");
        let status = response.status();
        let header_text = |name: &str| {
            response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
        };
        let thread_id = header_text(THREAD_ID_HEADER);
        let content_type = header_text(header::CONTENT_TYPE.as_str());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        Reply { status, thread_id, content_type, body: String::from_utf8_lossy(&bytes).to_string() }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_json(value: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(RELAY_ROUTE)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn missing_inputs_are_rejected_from_query_and_body() {
        let (app, _, agent_id) = relay_with_agent().await;

        let only_message = send(app.clone(), get(&format!("{RELAY_ROUTE}?message=hi"))).await;
        let only_agent = send(app.clone(), post_json(json!({ "agentid": agent_id.as_str() }))).await;
        let nothing = send(app, get(RELAY_ROUTE)).await;

        for reply in [only_message, only_agent, nothing] {
            assert_eq!(reply.status, StatusCode::BAD_REQUEST);
            assert_eq!(
                reply.body,
                "Pass in a message and agentid in the query string or in the request body for a personalized response."
            );
        }
    }

    #[tokio::test]
    async fn unknown_agent_is_not_found() {
        let (app, _, _) = relay_with_agent().await;

        let reply = send(app, get(&format!("{RELAY_ROUTE}?message=hi&agentid=asst_unknown"))).await;

        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, "Agent with ID asst_unknown not found.");
    }

    #[tokio::test]
    async fn missing_relay_endpoint_is_a_server_error() {
        let app = router(None);

        let reply = send(app, get(&format!("{RELAY_ROUTE}?message=hi&agentid=asst_1"))).await;

        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body, "Internal Server Error: Missing AIProjectConnString.");
    }

    #[tokio::test]
    async fn input_validation_runs_before_endpoint_check() {
        let reply = send(router(None), get(RELAY_ROUTE)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn new_conversation_returns_json_string_and_thread_id() {
        let (app, client, agent_id) = relay_with_agent().await;

        let reply = send(
            app,
            get(&format!("{RELAY_ROUTE}?message=list%20exemptions&agentid={agent_id}")),
        )
        .await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.content_type.as_deref(), Some("application/json"));
        assert_eq!(reply.body, "\"received: list exemptions\"");
        assert!(reply.thread_id.is_some());
        assert_eq!(client.stats().await.threads_created, 1);
    }

    #[tokio::test]
    async fn thread_id_from_previous_reply_continues_the_conversation() {
        let (app, client, agent_id) = relay_with_agent().await;

        let first = send(app.clone(), post_json(json!({"message": "one", "agentid": agent_id.as_str()})))
            .await;
        let thread_id = first.thread_id.clone().expect("thread id header");
        let second = send(
            app,
            post_json(json!({"message": "two", "agentid": agent_id.as_str(), "threadid": thread_id})),
        )
        .await;

        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.thread_id, first.thread_id);
        assert_eq!(second.body, "\"received: two\"");
        assert_eq!(client.stats().await.threads_created, 1);
    }

    #[tokio::test]
    async fn unknown_thread_surfaces_as_internal_error() {
        let (app, _, agent_id) = relay_with_agent().await;

        let reply = send(
            app,
            get(&format!("{RELAY_ROUTE}?message=hi&agentid={agent_id}&threadid=thread_missing")),
        )
        .await;

        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(reply.body.starts_with("Internal Server Error: "));
    }

    #[tokio::test]
    async fn malformed_body_falls_back_to_query() {
        let (app, _, agent_id) = relay_with_agent().await;
        let request = Request::builder()
            .method("POST")
            .uri(format!("{RELAY_ROUTE}?message=hi&agentid={agent_id}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");

        let reply = send(app, request).await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "\"received: hi\"");
    }

    #[tokio::test]
    async fn repeated_query_keys_use_the_first_value() {
        let (app, _, agent_id) = relay_with_agent().await;

        let reply = send(
            app,
            get(&format!("{RELAY_ROUTE}?message=first&message=second&agentid={agent_id}&agentid=asst_other")),
        )
        .await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, "\"received: first\"");
    }

    #[tokio::test]
    async fn traversal_agent_id_is_not_found() {
        let (app, _, _) = relay_with_agent().await;

        let reply = send(app, get(&format!("{RELAY_ROUTE}?message=hi&agentid=..%2Fassistants"))).await;

        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, "Agent with ID ../assistants not found.");
    }

    #[test]
    fn non_empty_query_values_win_per_field() {
        let query = RelayParams {
            message: Some("from query".to_string()),
            agentid: Some(String::new()),
            threadid: None,
        };
        let body = RelayParams {
            message: Some("from body".to_string()),
            agentid: Some("asst_body".to_string()),
            threadid: Some("thread_body".to_string()),
        };

        let request = merge_inputs(query, Some(body)).expect("inputs present");

        assert_eq!(request.message, "from query");
        assert_eq!(request.agent_id.as_str(), "asst_body");
        assert_eq!(request.thread_id.map(|id| id.0), Some("thread_body".to_string()));
    }
}
