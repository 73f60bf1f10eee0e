//! Outbound chat-completion clients.
//!
//! The gateway only ever needs one capability from a model provider: send a
//! prompt with fixed parameters, get text back. [`CompletionClient`] is that
//! seam; [`OpenAiClient`] and [`AzureInferenceClient`] are the two wire
//! dialects we speak, picked at startup by [`Provider`].

mod azure;
mod openai;

pub use azure::AzureInferenceClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use clap::ValueEnum;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{ChatCompletionRequest, ChatCompletionResponse, CompletionRequest};

/// A failed upstream call, before it is mapped to a client-facing error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamFailure {
    /// HTTP status from the upstream; `None` when no response came back.
    pub status: Option<u16>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl UpstreamFailure {
    pub fn is_throttle(&self) -> bool {
        self.status == Some(429)
    }

    // transport/decode failure; details stay in the log
    fn transport() -> Self {
        Self {
            status: None,
            message: "Upstream request failed".to_string(),
            retry_after: None,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Submit one prompt. `Ok(None)` means the upstream answered but sent no
    /// completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, UpstreamFailure>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// OpenAI-compatible API, bearer token auth
    Openai,
    /// Azure AI Inference / GitHub Models API, `api-key` header auth
    Azure,
}

// Pick the adapter the config asks for
pub fn build_client(
    provider: Provider,
    http: reqwest::Client,
    endpoint: &str,
    api_key: &str,
    api_version: &str,
) -> Arc<dyn CompletionClient> {
    match provider {
        Provider::Openai => Arc::new(OpenAiClient::new(http, endpoint, api_key)),
        Provider::Azure => Arc::new(AzureInferenceClient::new(http, endpoint, api_key, api_version)),
    }
}

fn completions_url(endpoint: &str) -> String {
    format!("{}/chat/completions", endpoint.trim().trim_end_matches('/'))
}

/// `Retry-After` as delta-seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// Send a chat completion and read back the first choice
async fn send_chat(
    builder: reqwest::RequestBuilder,
    request: &CompletionRequest,
) -> Result<Option<String>, UpstreamFailure> {
    let res = builder
        .json(&ChatCompletionRequest::from(request))
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "upstream request failed");
            UpstreamFailure::transport()
        })?;

    let status = res.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(res.headers());
        let body = res.json::<Value>().await.unwrap_or(Value::Null);
        let message = body
            .pointer("/error/message")
            .or_else(|| body.pointer("/message"))
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Upstream error")
            .to_string();

        return Err(UpstreamFailure {
            status: Some(status.as_u16()),
            message,
            retry_after,
        });
    }

    let body = res.json::<ChatCompletionResponse>().await.map_err(|e| {
        warn!(error = %e, "upstream response could not be decoded");
        UpstreamFailure::transport()
    })?;

    Ok(body.into_first_content())
}
