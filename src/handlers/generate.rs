use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::request::Parts,
};
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::GenerateResponse;
use crate::state::AppState;

/// Rate limit key for the caller: peer IP when the server tracks connect
/// info, else the first `X-Forwarded-For` hop, else `local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientAddr(addr.ip().to_string()));
        }

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        Ok(ClientAddr(forwarded.unwrap_or("local").to_string()))
    }
}

// body must be a JSON object with a non-blank string `prompt`
fn extract_prompt(body: &[u8]) -> Result<String, GatewayError> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|value| value.get("prompt"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .map(str::to_string)
        .ok_or(GatewayError::InvalidInput("Prompt is required."))
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    body: Bytes,
) -> Result<Json<GenerateResponse>, GatewayError> {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();

    let result = generate(&state, &client, &body).await;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    match &result {
        Ok(_) => debug!(client = %client, "generate ok"),
        Err(e) => info!(client = %client, status = e.status().as_u16(), error = %e, "generate failed"),
    }

    result.map(|text| Json(GenerateResponse { text }))
}

async fn generate(state: &AppState, client: &str, body: &[u8]) -> Result<String, GatewayError> {
    if let Err(e) = state.rate_limiter.check(client) {
        RATE_LIMITED_TOTAL.inc();
        return Err(e);
    }

    let prompt = extract_prompt(body)?;
    let caller = state.caller.as_ref().ok_or(GatewayError::Unconfigured)?;

    caller.generate(&prompt).await
}
