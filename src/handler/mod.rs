//! URL-prefix routing and the pieces shared by every article handler:
//! `<id>.<ext>` parsing, header propagation, `ETag` construction, and the
//! fallback static file service for anything outside `/m/`, `/d/`, `/h/`.

pub mod get;
pub mod head;
pub mod post;
pub mod stream;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::routing::{get as get_method, head as head_method};
use axum::Router;
use tower_http::services::ServeDir;

use crate::error::GatewayError;
use crate::nntp::types::{Article, MessageId};
use crate::state::AppState;

/// Reserved `Content-Type` for every article response; the URL extension
/// (`.csv`/`.nfo`) only gates which requests are accepted, it never selects
/// a different outbound content type.
pub const CONTENT_TYPE_ARTICLE: &str = "text/plain; charset=utf-8";

pub fn build_router(state: AppState, static_dir: &str) -> Router {
    Router::new()
        .route(
            "/m/{id_ext}",
            get_method(get::get_or_head)
                .head(get::get_or_head)
                .post(post::post_article),
        )
        .route(
            "/d/{id_ext}",
            get_method(stream::get_or_head)
                .head(stream::get_or_head)
                .post(post::post_article),
        )
        .route("/h/{id_ext}", head_method(head::head_only))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// Split a `<message-id>.<ext>` URL segment. The extension is always the
/// substring after the *last* `.`, since a Message-ID's local or domain part
/// may itself contain dots.
pub fn parse_id_and_ext(segment: &str) -> Result<(MessageId, String), GatewayError> {
    let (id, ext) = segment
        .rsplit_once('.')
        .ok_or(GatewayError::BadExtension)?;

    if ext != "csv" && ext != "nfo" {
        return Err(GatewayError::BadExtension);
    }

    let message_id = MessageId::parse(id)?;
    Ok((message_id, ext.to_string()))
}

/// Response headers stripped for privacy when propagating NNTP headers back
/// to the client.
const RESERVED_RESPONSE_HEADERS: &[&str] = &["organization", "x-complaints-to"];

/// Re-expose every NNTP response header under an `X-Usenet-` prefix, except
/// the privacy-sensitive ones above.
pub fn propagate_headers(headers: &mut HeaderMap, article: &Article) {
    for header in &article.headers {
        if RESERVED_RESPONSE_HEADERS
            .iter()
            .any(|reserved| header.name_eq_ignore_ascii_case(reserved))
        {
            continue;
        }

        let name = format!("x-usenet-{}", header.name.to_ascii_lowercase());
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
}

/// `ETag` is always the short-id (Message-ID without angle brackets), since
/// article content never changes once posted.
pub fn etag_value(message_id: &MessageId) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{}\"", message_id.as_str()))
        .unwrap_or_else(|_| HeaderValue::from_static("\"invalid\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_and_ext_accepts_csv_and_nfo() {
        let (id, ext) = parse_id_and_ext("abc123@example.com.csv").unwrap();
        assert_eq!(id.as_str(), "abc123@example.com");
        assert_eq!(ext, "csv");

        let (id, ext) = parse_id_and_ext("abc123@example.com.nfo").unwrap();
        assert_eq!(id.as_str(), "abc123@example.com");
        assert_eq!(ext, "nfo");
    }

    #[test]
    fn parse_id_and_ext_rejects_other_extensions() {
        assert!(matches!(
            parse_id_and_ext("abc123@example.com.exe"),
            Err(GatewayError::BadExtension)
        ));
    }

    #[test]
    fn parse_id_and_ext_rejects_missing_extension() {
        assert!(matches!(
            parse_id_and_ext("abc123@example.com"),
            Err(GatewayError::BadExtension)
        ));
    }

    #[test]
    fn parse_id_and_ext_handles_dotted_local_part() {
        let (id, ext) = parse_id_and_ext("part1.part2@example.com.csv").unwrap();
        assert_eq!(id.as_str(), "part1.part2@example.com");
        assert_eq!(ext, "csv");
    }

    #[test]
    fn propagate_headers_strips_privacy_sensitive_ones() {
        let mut article = Article::default();
        article.push_header("Subject", "hello");
        article.push_header("Organization", "secret corp");
        article.push_header("X-Complaints-To", "abuse@example.com");

        let mut headers = HeaderMap::new();
        propagate_headers(&mut headers, &article);

        assert_eq!(
            headers.get("x-usenet-subject").unwrap(),
            HeaderValue::from_static("hello")
        );
        assert!(headers.get("x-usenet-organization").is_none());
        assert!(headers.get("x-usenet-x-complaints-to").is_none());
    }
}
