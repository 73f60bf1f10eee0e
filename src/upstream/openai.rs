use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

use super::{CompletionClient, UpstreamFailure, completions_url, send_chat};
use crate::models::CompletionRequest;

// OpenAI-compatible chat completions, bearer token auth
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            http,
            url: completions_url(endpoint),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, UpstreamFailure> {
        let builder = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key));

        send_chat(builder, request).await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
