use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("voice_gateway_requests_total", "Total number of generate requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "voice_gateway_rate_limited_total",
        "Requests rejected by the local per-client limiter"
    )
    .unwrap();
    pub static ref UPSTREAM_RETRIES: Counter = register_counter!(
        "voice_gateway_upstream_retries_total",
        "Upstream calls retried after a throttling response"
    )
    .unwrap();
    pub static ref UPSTREAM_TIMEOUTS: Counter = register_counter!(
        "voice_gateway_upstream_timeouts_total",
        "Requests that hit the overall upstream deadline"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "voice_gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_BUCKETS: Gauge =
        register_gauge!("voice_gateway_rate_limit_buckets", "Current number of per-client rate buckets").unwrap();
}
