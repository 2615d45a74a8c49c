//! Error types and their HTTP projection.
//!
//! One `GatewayError` enum covers every row of the error-handling table: each
//! variant knows its own HTTP status and whether the NNTP connection that
//! produced it must be closed rather than returned to the pool. The process
//! never panics on a per-request error path; everything here is surfaced via
//! `Result` and `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("malformed Message-ID: {0}")]
    BadMessageId(String),

    #[error("unsupported file extension")]
    BadExtension,

    #[error("unknown URL prefix")]
    BadPrefix,

    #[error("no upstream server matched the request")]
    NoServerAvailable,

    #[error("article not found")]
    ArticleNotFound,

    #[error("NNTP protocol error {code}: {message}")]
    NntpProtocol { code: u16, message: String },

    #[error("posting not permitted")]
    PostingNotPermitted,

    #[error("posting failed: {0}")]
    PostingFailed(String),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("article exceeds configured size limit")]
    ArticleTooLarge,

    #[error("empty request body")]
    EmptyBody,

    #[error("range not satisfiable")]
    RangeNotSatisfiable { complete_length: u64 },

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("not modified")]
    NotModified,

    #[error("pool wait was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the NNTP connection that produced this error must be
    /// discarded (transport-level failure) rather than returned to the pool
    /// (protocol-level failure, or no connection was ever involved).
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport(_) | GatewayError::ArticleTooLarge
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::BadMessageId(_)
            | GatewayError::BadExtension
            | GatewayError::BadPrefix
            | GatewayError::EmptyBody => StatusCode::BAD_REQUEST,
            GatewayError::ArticleNotFound | GatewayError::NoServerAvailable => {
                StatusCode::NOT_FOUND
            }
            GatewayError::PostingNotPermitted | GatewayError::PostingFailed(_) => {
                StatusCode::CONFLICT
            }
            GatewayError::ArticleTooLarge => StatusCode::INSUFFICIENT_STORAGE,
            GatewayError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            GatewayError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            GatewayError::NotModified => StatusCode::NOT_MODIFIED,
            GatewayError::NntpProtocol { .. }
            | GatewayError::Transport(_)
            | GatewayError::Cancelled
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "handler: request failed");
        } else {
            tracing::warn!(error = %self, "handler: request rejected");
        }

        let mut response = (status, self.to_string()).into_response();

        if let GatewayError::RangeNotSatisfiable { complete_length } = &self {
            if let Ok(value) =
                axum::http::HeaderValue::from_str(&format!("bytes */{complete_length}"))
            {
                response
                    .headers_mut()
                    .insert(axum::http::header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

/// Startup-only configuration errors. These are the only errors permitted to
/// terminate the process (with a nonzero exit code) rather than be mapped to
/// an HTTP response.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
