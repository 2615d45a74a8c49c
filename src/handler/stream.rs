//! `/d/` — raw article pass-through: no byte-range support, so there is no
//! need to buffer-then-slice the way `/m/` does. GET uses
//! `FetchKind::Raw`, which asks the NNTP client for the body in its wire
//! dot-stuffed form (`CmdArticle(messageID, WithDotEncodedBody)`) instead of
//! dot-decoding it, so "raw" here means byte-for-byte wire framing, not just
//! "no range machinery, no precondition-driven caching nuance".

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::FetchKind;
use crate::error::GatewayError;
use crate::handler::{etag_value, parse_id_and_ext, propagate_headers, CONTENT_TYPE_ARTICLE};
use crate::range::{self, PreconditionOutcome};
use crate::state::AppState;

#[tracing::instrument(skip(state, headers), fields(path = %id_ext))]
pub async fn get_or_head(
    State(state): State<AppState>,
    Path(id_ext): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let (message_id, _ext) = parse_id_and_ext(&id_ext)?;

    if range::check_preconditions(&headers, &method) == PreconditionOutcome::NotModified {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    if method == Method::HEAD {
        let article = state
            .dispatcher
            .get_article(&message_id, FetchKind::Head)
            .await?;
        return Ok(super::head::build_head_response(&message_id, &article));
    }

    let article = state
        .dispatcher
        .get_article(&message_id, FetchKind::Raw)
        .await?;
    let len = article.body.len();

    let mut response = (StatusCode::OK, article.body.clone()).into_response();
    let out = response.headers_mut();
    out.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string()).expect("decimal length is a valid header value"),
    );
    out.entry(axum::http::header::CONTENT_TYPE)
        .or_insert_with(|| HeaderValue::from_static(CONTENT_TYPE_ARTICLE));
    out.insert(axum::http::header::ETAG, etag_value(&message_id));
    propagate_headers(out, &article);

    Ok(response)
}
