//! `/m/` — standard article GET/HEAD: buffered body, full range and
//! precondition support.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::FetchKind;
use crate::error::GatewayError;
use crate::handler::{etag_value, parse_id_and_ext, propagate_headers, CONTENT_TYPE_ARTICLE};
use crate::nntp::types::{Article, MessageId};
use crate::range::{self, ByteRange, PreconditionOutcome, RangeResponse};
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
        .get_article(&message_id, FetchKind::Decoded)
        .await?;
    let total_len = article.body.len() as u64;

    let ranges = range::parse_range_header(&headers, total_len).map_err(|()| {
        GatewayError::RangeNotSatisfiable {
            complete_length: total_len,
        }
    })?;

    let mut response = match range::classify(ranges) {
        RangeResponse::Full => build_full_response(&article),
        RangeResponse::Single(r) => build_single_range_response(&article, r, total_len),
        RangeResponse::Multipart(rs) => build_multipart_response(&article, &rs, total_len),
    };

    apply_common_headers(response.headers_mut(), &message_id, &article);
    Ok(response)
}

/// Headers every article response carries, applied with `entry().or_insert`
/// so a branch that already set a more specific `Content-Type` (the
/// multipart case) is not clobbered.
fn apply_common_headers(headers: &mut HeaderMap, message_id: &MessageId, article: &Article) {
    headers
        .entry(axum::http::header::CONTENT_TYPE)
        .or_insert_with(|| HeaderValue::from_static(CONTENT_TYPE_ARTICLE));
    headers.insert(
        axum::http::header::ACCEPT_RANGES,
        HeaderValue::from_static("bytes"),
    );
    headers.insert(axum::http::header::ETAG, etag_value(message_id));
    propagate_headers(headers, article);
}

fn build_full_response(article: &Article) -> Response {
    let len = article.body.len();
    let mut response = Body::from(article.body.clone()).into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string()).expect("decimal length is a valid header value"),
    );
    response
}

fn build_single_range_response(article: &Article, r: ByteRange, total_len: u64) -> Response {
    let slice = &article.body[r.start as usize..=r.end as usize];
    let mut response = (StatusCode::PARTIAL_CONTENT, slice.to_vec()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes {}-{}/{}", r.start, r.end, total_len))
            .expect("range header is ASCII"),
    );
    headers.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&r.len().to_string()).expect("decimal length is a valid header value"),
    );
    response
}

fn build_multipart_response(article: &Article, ranges: &[ByteRange], total_len: u64) -> Response {
    let content_length =
        range::multipart_content_length(ranges, total_len, CONTENT_TYPE_ARTICLE);
    let body = range::render_multipart(ranges, &article.body, CONTENT_TYPE_ARTICLE);
    let mut response = (StatusCode::PARTIAL_CONTENT, body).into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::CONTENT_TYPE, range::multipart_content_type());
    headers.insert(
        axum::http::header::CONTENT_LENGTH,
        HeaderValue::from_str(&content_length.to_string())
            .expect("decimal length is a valid header value"),
    );
    response
}
