//! `/h/` — `HEAD`-only article headers, and the shared headers-only response
//! builder used by the `HEAD` method on `/m/` and `/d/` as well.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::FetchKind;
use crate::error::GatewayError;
use crate::handler::{etag_value, parse_id_and_ext, propagate_headers};
use crate::nntp::types::{Article, MessageId};
use crate::range::{self, PreconditionOutcome};
use crate::state::AppState;

#[tracing::instrument(skip(state, headers), fields(path = %id_ext))]
pub async fn head_only(
    State(state): State<AppState>,
    Path(id_ext): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let (message_id, _ext) = parse_id_and_ext(&id_ext)?;

    if range::check_preconditions(&headers, &Method::HEAD) == PreconditionOutcome::NotModified {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let article = state
        .dispatcher
        .get_article(&message_id, FetchKind::Head)
        .await?;
    Ok(build_head_response(&message_id, &article))
}

/// No `Content-Length` is set here: a `HEAD` NNTP command never reads a
/// body, so there is nothing to measure.
pub fn build_head_response(message_id: &MessageId, article: &Article) -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::ETAG, etag_value(message_id));
    propagate_headers(headers, article);
    response
}
