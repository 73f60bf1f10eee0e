use async_trait::async_trait;

use super::{CompletionClient, UpstreamFailure, completions_url, send_chat};
use crate::models::CompletionRequest;

// Azure AI Inference (GitHub Models) chat completions
pub struct AzureInferenceClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AzureInferenceClient {
    pub fn new(http: reqwest::Client, endpoint: &str, api_key: &str, api_version: &str) -> Self {
        // reqwest's query builder is behind a feature we don't pull in
        let url = format!("{}?api-version={}", completions_url(endpoint), api_version.trim());

        Self {
            http,
            url,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for AzureInferenceClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, UpstreamFailure> {
        let builder = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key);

        send_chat(builder, request).await
    }

    fn name(&self) -> &'static str {
        "azure"
    }
}
