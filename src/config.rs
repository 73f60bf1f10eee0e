use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::caller::RetryPolicy;
use crate::models::GenerationParams;
use crate::upstream::Provider;

// CLI argument structure, every flag can also come from the environment (or .env)
#[derive(Parser, Debug, Clone)]
#[command(name = "voice-gateway")]
#[command(about = "Rate-limited, retrying proxy in front of a hosted chat completion API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Which upstream wire dialect to speak
    #[arg(long, env = "UPSTREAM_PROVIDER", value_enum, default_value_t = Provider::Azure)]
    pub provider: Provider,

    // Upstream endpoint base url
    #[arg(short, long, env = "GITHUB_MODELS_ENDPOINT", default_value = "https://models.github.ai/inference")]
    pub endpoint: String,

    // Upstream credential; without it every generate call answers 400
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub api_key: Option<String>,

    // Target model identifier
    #[arg(short, long, env = "GITHUB_MODEL", default_value = "openai/gpt-4.1")]
    pub model: String,

    // Overall deadline per request in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 15_000)]
    pub request_timeout_ms: u64,

    // Ceiling on a single retry sleep in milliseconds
    #[arg(long, env = "RETRY_MAX_WAIT_MS", default_value_t = 5_000)]
    pub retry_max_wait_ms: u64,

    // Upstream attempts per request, first call included
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    // Rate limit max requests per window, per client
    #[arg(long, env = "RPM_LIMIT", default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    pub rpm_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_WINDOW_SECS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    // Stale rate bucket sweep interval in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: u64,

    // Browser origins allowed to call us (comma-separated)
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173,http://localhost:5174,http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "TEMPERATURE", default_value_t = 1.0)]
    pub temperature: f32,

    #[arg(long, env = "TOP_P", default_value_t = 1.0)]
    pub top_p: f32,

    // Optional system message sent ahead of every prompt
    #[arg(long, env = "SYSTEM_PROMPT", default_value = "")]
    pub system_prompt: String,

    // api-version query parameter for the azure provider
    #[arg(long, env = "AZURE_API_VERSION", default_value = "2024-05-01-preview")]
    pub api_version: String,
}

impl Args {
    /// The upstream credential, unless it is missing or blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_wait: Duration::from_millis(self.retry_max_wait_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn generation_params(&self) -> GenerationParams {
        let system = self.system_prompt.trim();
        GenerationParams {
            model: self.model.trim().to_string(),
            temperature: self.temperature,
            top_p: self.top_p,
            system_prompt: (!system.is_empty()).then(|| system.to_string()),
        }
    }

    // CORS for the browser frontend; bad origins are skipped, not fatal
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin, "ignoring invalid allowed origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    }
}
