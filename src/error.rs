//! Failure taxonomy shared by every stage of a resolution.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::fmt;

use crate::dedup::Abandoned;
use crate::types::ErrorResponse;

/// Which upstream service a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamLeg {
    Catalog,
    Delivery,
}

impl fmt::Display for UpstreamLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamLeg::Catalog => f.write_str("catalog"),
            UpstreamLeg::Delivery => f.write_str("delivery"),
        }
    }
}

/// Every failure is tagged where it happens so callers can decide between
/// "no result" and "upstream is misbehaving" without string matching.
///
/// `Clone` because a coalesced resolution hands the same error to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid query: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The surrounding context was cancelled (deadline, shutdown, or a race
    /// that already has a winner) before a result was produced.
    #[error("cancelled before a result was found")]
    Cancelled,
    #[error("{leg} upstream error: {detail}")]
    Upstream { leg: UpstreamLeg, detail: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResolveError {
    pub fn upstream(leg: UpstreamLeg, detail: impl Into<String>) -> Self {
        ResolveError::Upstream {
            leg,
            detail: detail.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResolveError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ResolveError::NotFound(_) | ResolveError::Cancelled => StatusCode::NOT_FOUND,
            ResolveError::Upstream {
                leg: UpstreamLeg::Catalog,
                ..
            } => StatusCode::BAD_GATEWAY,
            ResolveError::Upstream {
                leg: UpstreamLeg::Delivery,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            ResolveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing text. Transport details stay in the logs.
    pub fn description(&self) -> String {
        match self {
            ResolveError::InvalidInput(reason) => reason.clone(),
            ResolveError::NotFound(_) | ResolveError::Cancelled => {
                "No playable track was found for this query".to_string()
            }
            ResolveError::Upstream {
                leg: UpstreamLeg::Catalog,
                ..
            } => "The catalog service could not be reached or returned an invalid response"
                .to_string(),
            ResolveError::Upstream {
                leg: UpstreamLeg::Delivery,
                ..
            } => "The delivery service could not be reached or returned an invalid response"
                .to_string(),
            ResolveError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Short transport-level summary of a failed outbound call, for logs.
pub(crate) fn transport_detail(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    }
}

impl From<Abandoned> for ResolveError {
    fn from(err: Abandoned) -> Self {
        ResolveError::Internal(err.to_string())
    }
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: status.as_u16(),
            name: status.canonical_reason().unwrap_or("Unknown").to_string(),
            description: self.description(),
        };
        (status, Json(body)).into_response()
    }
}
