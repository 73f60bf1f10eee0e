use std::sync::Arc;
use crate::caller::UpstreamCaller;
use crate::rate_limit::RateLimiter;
// app's shared state

pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub caller: Option<UpstreamCaller>, // None when no upstream credential is configured
}
