use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorBody;
use crate::upstream::UpstreamFailure;

// Who throttled the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    Local,
    Upstream,
}

impl Throttle {
    fn message(self) -> &'static str {
        match self {
            Throttle::Local => "Too many requests. Please wait ~1 minute and retry.",
            Throttle::Upstream => {
                "Rate limited upstream. Please reduce frequency or wait and retry."
            }
        }
    }
}

/// Every way a `/api/generate` call can fail. The `Display` text is what the
/// client sees in the `error` field.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Upstream credential missing. Set GITHUB_TOKEN and restart the gateway.")]
    Unconfigured,

    #[error("{}", .origin.message())]
    RateLimited {
        origin: Throttle,
        retry_after: Option<u64>,
    },

    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidInput(_) | GatewayError::Unconfigured => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream { status, .. } => *status,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GatewayError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<UpstreamFailure> for GatewayError {
    fn from(failure: UpstreamFailure) -> Self {
        if failure.is_throttle() {
            return GatewayError::RateLimited {
                origin: Throttle::Upstream,
                // round partial seconds up so the client never retries early
                retry_after: failure
                    .retry_after
                    .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0)),
            };
        }

        let status = failure
            .status
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        GatewayError::Upstream {
            status,
            message: failure.message,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
