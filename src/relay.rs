//! Chat relay — the request pipeline from browser to upstream model.
//!
//! One sequential pipeline per request: authenticate the bearer token,
//! assemble a context snapshot, forward transcript + context upstream with
//! streaming enabled, then pipe the event-stream bytes back verbatim.
//! Every failure is terminal for its request; nothing is retried. The relay
//! writes nothing — its only backend traffic is the assembler's reads.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::config::RelayConfig;
use crate::context::ContextAssembler;
use crate::error::{BackendError, RelayError};
use crate::prompt;

/// Upstream request timeout. Streaming responses are exempt from the
/// overall timeout once headers arrive; this bounds connect + first byte.
const UPSTREAM_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Inbound chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(rename = "projectId", default)]
    pub project_id: Option<String>,
}

/// A transcript entry on the wire — inbound from the browser and outbound
/// to the upstream model unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// Body of the upstream chat-completion request.
#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
}

/// Shared relay state, cloned per request.
#[derive(Clone)]
pub struct RelayState {
    backend: Arc<dyn Backend>,
    assembler: Arc<ContextAssembler>,
    client: reqwest::Client,
    upstream_url: Arc<str>,
    upstream_api_key: SecretString,
    model: Arc<str>,
}

impl RelayState {
    /// Build relay state from startup configuration.
    ///
    /// The upstream credential is validated here, not on first use: a relay
    /// without one is `Misconfigured` and should never start serving.
    pub fn new(config: &RelayConfig, backend: Arc<dyn Backend>) -> Result<Self, RelayError> {
        if config.upstream_api_key.expose_secret().trim().is_empty() {
            return Err(RelayError::Misconfigured);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Ok(Self {
            backend: Arc::clone(&backend),
            assembler: Arc::new(ContextAssembler::new(backend)),
            client,
            upstream_url: Arc::from(config.upstream_url.as_str()),
            upstream_api_key: config.upstream_api_key.clone(),
            model: Arc::from(config.model.as_str()),
        })
    }
}

/// Build the Axum router for `/api/chat`.
///
/// The permissive CORS layer also answers OPTIONS pre-flights with an empty
/// 200, unauthenticated, as the browser expects.
pub fn chat_routes(state: RelayState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn chat_handler(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    match run_pipeline(&state, &headers, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Chat request failed");
            err.into_response()
        }
    }
}

/// The authenticate → assemble → forward → stream pipeline.
async fn run_pipeline(
    state: &RelayState,
    headers: &HeaderMap,
    request: ChatRequest,
) -> Result<Response, RelayError> {
    // Authenticate before touching the backend or the upstream.
    let token = bearer_token(headers)?;
    let user = state.backend.verify_token(token).await.map_err(|e| {
        match e {
            BackendError::AuthRejected => {}
            other => warn!(error = %other, "Token verification errored"),
        }
        RelayError::InvalidAuth
    })?;

    let snapshot = state
        .assembler
        .assemble(token, &user, request.project_id.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, user = %user.id, "Context assembly failed");
            RelayError::ContextAssembly(e)
        })?;

    let system = WireMessage {
        role: "system".to_string(),
        content: prompt::compose(&snapshot),
    };
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(system);
    messages.extend(request.messages);

    let body = UpstreamRequest {
        model: &state.model,
        messages,
        stream: true,
    };

    let resp = state
        .client
        .post(&*state.upstream_url)
        .bearer_auth(state.upstream_api_key.expose_secret())
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "Upstream request could not be sent");
            RelayError::UpstreamFailure
        })?;

    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(RelayError::RateLimited);
    }
    if status == reqwest::StatusCode::PAYMENT_REQUIRED {
        return Err(RelayError::QuotaExhausted);
    }
    if !status.is_success() {
        // Raw upstream detail is for operators only.
        let detail = resp.text().await.unwrap_or_default();
        error!(status = %status, detail = %detail, "Upstream chat request failed");
        return Err(RelayError::UpstreamFailure);
    }

    info!(user = %user.id, project = ?request.project_id, "Streaming chat response");
    // Pipe the upstream bytes through without buffering. Dropping the
    // response body (client went away) drops the upstream connection
    // with it.
    let stream = resp.bytes_stream().map_err(std::io::Error::other);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Extract the bearer credential from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, RelayError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::MissingAuth)?;
    let token = value.strip_prefix("Bearer ").unwrap_or("").trim();
    if token.is_empty() {
        return Err(RelayError::MissingAuth);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = value {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn bearer_token_extraction() {
        assert_eq!(
            bearer_token(&headers_with(Some("Bearer abc123"))).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn missing_header_is_missing_auth() {
        assert!(matches!(
            bearer_token(&headers_with(None)),
            Err(RelayError::MissingAuth)
        ));
    }

    #[test]
    fn non_bearer_scheme_is_missing_auth() {
        assert!(matches!(
            bearer_token(&headers_with(Some("Basic dXNlcjpwdw=="))),
            Err(RelayError::MissingAuth)
        ));
        assert!(matches!(
            bearer_token(&headers_with(Some("Bearer "))),
            Err(RelayError::MissingAuth)
        ));
    }

    #[test]
    fn chat_request_accepts_camel_case_project_id() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"projectId":"p1"}"#,
        )
        .unwrap();
        assert_eq!(req.project_id.as_deref(), Some("p1"));
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn empty_upstream_key_is_misconfigured() {
        use crate::config::RelayConfig;

        let config = RelayConfig {
            upstream_api_key: SecretString::from(""),
            upstream_url: "https://upstream.example.com".into(),
            model: "test-model".into(),
            backend_url: "https://backend.example.com".into(),
            backend_api_key: SecretString::from("key"),
            port: 0,
        };
        let backend = Arc::new(crate::backend::RestBackend::new(
            "https://backend.example.com",
            SecretString::from("key"),
        ));
        assert!(matches!(
            RelayState::new(&config, backend),
            Err(RelayError::Misconfigured)
        ));
    }
}
