use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voice_gateway::caller::UpstreamCaller;
use voice_gateway::config::Args;
use voice_gateway::rate_limit::{RateLimiter, bucket_sweeper};
use voice_gateway::state::AppState;
use voice_gateway::{router, upstream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap's env fallbacks can see it
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build upstream http client")?;

    let caller = args.credential().map(|api_key| {
        let client = upstream::build_client(args.provider, http, &args.endpoint, api_key, &args.api_version);
        UpstreamCaller::new(client, args.generation_params(), args.retry_policy(), args.request_timeout())
    });
    if caller.is_none() {
        warn!("GITHUB_TOKEN not set; /api/generate will answer 400 until it is configured");
    }

    let rate_limiter = Arc::new(RateLimiter::new(args.rpm_limit, args.rate_window()));

    // spawn the stale bucket sweeper
    tokio::spawn(bucket_sweeper(Arc::clone(&rate_limiter), args.sweep_interval()));

    let state = Arc::new(AppState {
        rate_limiter,
        caller,
    });
    let app = router(state, args.cors_layer());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Gateway running on http://localhost:{}", args.port);
    info!(provider = ?args.provider, endpoint = %args.endpoint, model = %args.model, "forwarding to upstream");
    info!(
        deadline_ms = args.request_timeout_ms,
        max_attempts = args.max_attempts,
        retry_max_wait_ms = args.retry_max_wait_ms,
        "upstream retry policy"
    );
    info!(
        "Rate limit: {} requests per {} seconds per client",
        args.rpm_limit, args.rate_window
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}
