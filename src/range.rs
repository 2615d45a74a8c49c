//! RFC 7232 precondition handling and RFC 7233 byte-range parsing and
//! response composition, collapsed to the "immutable content" policy this
//! gateway serves under: once a Message-ID exists its content never
//! changes, so every precondition question has one fixed answer.

use axum::http::{HeaderMap, HeaderValue, Method};

/// `If-Match`, `If-Unmodified-Since`, and `If-Range` are always satisfied:
/// there is no version of the resource to mismatch against. `If-None-Match`
/// and `If-Modified-Since` always indicate the client's cached copy is
/// still current, since the resource cannot have changed — for GET/HEAD
/// that means 304; for any other method (only POST reaches this check) the
/// same "already current" answer means the write is redundant, so spec.md
/// §4.4 maps it to 412 instead.
///
/// `If-Match`/`If-Unmodified-Since` failing would map to 412 on their own,
/// but since they always succeed here that branch never fires — documented
/// so a future move to mutable content knows exactly what to re-enable.
pub fn check_preconditions(headers: &HeaderMap, method: &Method) -> PreconditionOutcome {
    if headers.contains_key(axum::http::header::IF_NONE_MATCH)
        || headers.contains_key(axum::http::header::IF_MODIFIED_SINCE)
    {
        return if method == Method::GET || method == Method::HEAD {
            PreconditionOutcome::NotModified
        } else {
            PreconditionOutcome::PreconditionFailed
        };
    }
    PreconditionOutcome::Proceed
}

#[derive(Debug, PartialEq, Eq)]
pub enum PreconditionOutcome {
    Proceed,
    NotModified,
    PreconditionFailed,
}

/// A single parsed byte range, always resolved against the resource's total
/// length (no open-ended ranges past this point).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64, // inclusive
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range: bytes=...` header against a known total length.
///
/// Returns:
/// - `Ok(None)` if there is no Range header, or it isn't a `bytes` range
///   (the whole resource should be served as 200).
/// - `Ok(Some(ranges))` for one or more satisfiable ranges.
/// - `Err(())` if every requested range is unsatisfiable (the caller should
///   respond 416 with `Content-Range: bytes */<len>`).
pub fn parse_range_header(
    headers: &HeaderMap,
    total_len: u64,
) -> Result<Option<Vec<ByteRange>>, ()> {
    let Some(value) = headers.get(axum::http::header::RANGE) else {
        return Ok(None);
    };
    let Ok(value) = value.to_str() else {
        return Ok(None);
    };
    let Some(spec) = value.strip_prefix("bytes=") else {
        return Ok(None);
    };

    if total_len == 0 {
        return Err(());
    }

    let mut ranges = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(parsed) = parse_one_range(part, total_len) {
            ranges.push(parsed);
        }
    }

    if ranges.is_empty() {
        return Err(());
    }

    match sanitize_ranges(ranges, total_len) {
        Some(ranges) => Ok(Some(ranges)),
        None => Ok(None),
    }
}

fn parse_one_range(part: &str, total_len: u64) -> Option<ByteRange> {
    if let Some(suffix_len) = part.strip_prefix('-') {
        // "-N": last N bytes.
        let n: u64 = suffix_len.parse().ok()?;
        if n == 0 {
            return None;
        }
        let n = n.min(total_len);
        return Some(ByteRange {
            start: total_len - n,
            end: total_len - 1,
        });
    }

    let (start_str, end_str) = part.split_once('-')?;
    let start: u64 = start_str.parse().ok()?;
    if start >= total_len {
        return None;
    }

    if end_str.is_empty() {
        // "start-": from start to the end of the resource.
        return Some(ByteRange {
            start,
            end: total_len - 1,
        });
    }

    let end: u64 = end_str.parse().ok()?;
    if end < start {
        return None;
    }
    let end = end.min(total_len - 1);
    Some(ByteRange { start, end })
}

/// Discard abusive range sets (absurd numbers of tiny ranges requested to
/// force the server to do excessive work assembling a multipart response)
/// by capping the number of ranges honored; anything beyond the cap is
/// dropped rather than causing the whole request to fail.
const MAX_RANGES_PER_REQUEST: usize = 32;

/// spec.md §4.4's sanity guard: if the sum of requested range lengths
/// exceeds the resource size (abusive or broken clients sending
/// overlapping/duplicated ranges), discard every range and let the caller
/// fall back to serving the full body as a plain 200. Returns `None` in
/// that case, `Some(ranges)` otherwise (after the excess-count cap above).
fn sanitize_ranges(mut ranges: Vec<ByteRange>, total_len: u64) -> Option<Vec<ByteRange>> {
    if ranges.len() > MAX_RANGES_PER_REQUEST {
        tracing::warn!(
            requested = ranges.len(),
            allowed = MAX_RANGES_PER_REQUEST,
            "range: discarding excess ranges in abusive request"
        );
        ranges.truncate(MAX_RANGES_PER_REQUEST);
    }

    let total_requested: u64 = ranges.iter().map(ByteRange::len).sum();
    if total_requested > total_len {
        tracing::warn!(
            requested_bytes = total_requested,
            size = total_len,
            "range: requested ranges exceed resource size, serving full body"
        );
        return None;
    }

    Some(ranges)
}

/// One part of a multipart/byteranges response, or the single range/full
/// body case.
pub enum RangeResponse {
    Full,
    Single(ByteRange),
    Multipart(Vec<ByteRange>),
}

pub fn classify(ranges: Option<Vec<ByteRange>>) -> RangeResponse {
    match ranges {
        None => RangeResponse::Full,
        Some(mut r) if r.len() == 1 => RangeResponse::Single(r.remove(0)),
        Some(r) => RangeResponse::Multipart(r),
    }
}

const MULTIPART_BOUNDARY: &str = "usenet-gateway-boundary";

/// Build the `Content-Type` for a multipart/byteranges response.
pub fn multipart_content_type() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "multipart/byteranges; boundary={MULTIPART_BOUNDARY}"
    ))
    .expect("boundary string is valid header value")
}

fn part_header(range: &ByteRange, total_len: u64, content_type: &str) -> String {
    format!(
        "--{MULTIPART_BOUNDARY}\r\nContent-Type: {content_type}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
        range.start, range.end, total_len
    )
}

fn closing_boundary() -> String {
    format!("--{MULTIPART_BOUNDARY}--\r\n")
}

/// Compute the exact `Content-Length` a multipart/byteranges response will
/// have, without writing a single byte of the real body — a dry run over
/// the MIME framing only, so the header can be sent before body streaming
/// starts.
pub fn multipart_content_length(ranges: &[ByteRange], total_len: u64, content_type: &str) -> u64 {
    let mut len: u64 = 0;
    for range in ranges {
        len += part_header(range, total_len, content_type).len() as u64;
        len += range.len();
        len += 2; // trailing CRLF after each part's body
    }
    len += closing_boundary().len() as u64;
    len
}

/// Render the full multipart/byteranges body by slicing the given source
/// bytes for each range.
pub fn render_multipart(ranges: &[ByteRange], source: &[u8], content_type: &str) -> Vec<u8> {
    let total_len = source.len() as u64;
    let mut out = Vec::new();
    for range in ranges {
        out.extend_from_slice(part_header(range, total_len, content_type).as_bytes());
        out.extend_from_slice(&source[range.start as usize..=range.end as usize]);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(closing_boundary().as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers_with_range(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::header::RANGE,
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn no_range_header_serves_full_body() {
        let headers = HeaderMap::new();
        assert_eq!(parse_range_header(&headers, 100), Ok(None));
    }

    #[test]
    fn suffix_range_takes_last_n_bytes() {
        let headers = headers_with_range("bytes=-10");
        let ranges = parse_range_header(&headers, 100).unwrap().unwrap();
        assert_eq!(ranges, vec![ByteRange { start: 90, end: 99 }]);
    }

    #[test]
    fn open_ended_range_runs_to_end() {
        let headers = headers_with_range("bytes=50-");
        let ranges = parse_range_header(&headers, 100).unwrap().unwrap();
        assert_eq!(ranges, vec![ByteRange { start: 50, end: 99 }]);
    }

    #[test]
    fn closed_range_is_clamped_to_total_len() {
        let headers = headers_with_range("bytes=0-999999");
        let ranges = parse_range_header(&headers, 100).unwrap().unwrap();
        assert_eq!(ranges, vec![ByteRange { start: 0, end: 99 }]);
    }

    #[test]
    fn multi_range_request_parses_every_part() {
        let headers = headers_with_range("bytes=0-9,20-29");
        let ranges = parse_range_header(&headers, 100).unwrap().unwrap();
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 9 },
                ByteRange { start: 20, end: 29 },
            ]
        );
    }

    #[test]
    fn range_starting_past_end_is_unsatisfiable() {
        let headers = headers_with_range("bytes=200-300");
        assert_eq!(parse_range_header(&headers, 100), Err(()));
    }

    #[test]
    fn zero_length_resource_is_unsatisfiable() {
        let headers = headers_with_range("bytes=0-0");
        assert_eq!(parse_range_header(&headers, 0), Err(()));
    }

    #[test]
    fn excess_ranges_are_truncated_not_rejected() {
        let spec = (0..64).map(|i| format!("{i}-{i}")).collect::<Vec<_>>().join(",");
        let headers = headers_with_range(&format!("bytes={spec}"));
        let ranges = parse_range_header(&headers, 1000).unwrap().unwrap();
        assert_eq!(ranges.len(), MAX_RANGES_PER_REQUEST);
    }

    #[test]
    fn multipart_content_length_matches_rendered_body() {
        let ranges = vec![
            ByteRange { start: 0, end: 9 },
            ByteRange { start: 20, end: 29 },
        ];
        let source: Vec<u8> = (0..100u16).map(|i| (i % 256) as u8).collect();
        let predicted = multipart_content_length(&ranges, 100, "application/octet-stream");
        let rendered = render_multipart(&ranges, &source, "application/octet-stream");
        assert_eq!(predicted, rendered.len() as u64);
    }

    #[test]
    fn precondition_short_circuits_on_if_none_match_for_get() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::IF_NONE_MATCH,
            HeaderValue::from_static("*"),
        );
        assert_eq!(
            check_preconditions(&headers, &Method::GET),
            PreconditionOutcome::NotModified
        );
    }

    #[test]
    fn precondition_fails_on_if_none_match_for_post() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::IF_NONE_MATCH,
            HeaderValue::from_static("*"),
        );
        assert_eq!(
            check_preconditions(&headers, &Method::POST),
            PreconditionOutcome::PreconditionFailed
        );
    }

    #[test]
    fn precondition_proceeds_for_head_without_conditional_headers() {
        let headers = HeaderMap::new();
        assert_eq!(
            check_preconditions(&headers, &Method::HEAD),
            PreconditionOutcome::Proceed
        );
    }

    #[test]
    fn oversized_range_sum_discards_all_ranges() {
        let headers = headers_with_range("bytes=0-49,40-99");
        // 50 + 60 = 110 bytes requested against a 100-byte resource.
        assert_eq!(parse_range_header(&headers, 100), Ok(None));
    }

    #[test]
    fn precondition_proceeds_when_no_conditional_headers() {
        let headers = HeaderMap::new();
        assert_eq!(
            check_preconditions(&headers, &Method::GET),
            PreconditionOutcome::Proceed
        );
    }
}
