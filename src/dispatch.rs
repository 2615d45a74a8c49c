//! Deterministic server selection and the GET/HEAD/POST retry logic.
//!
//! `select_server` is a pure function: the same `(message_id, k)` pair
//! always names the same upstream index, which keeps repeated fetches of
//! the same article landing on the same upstream (and so on the same
//! upstream's own cache) instead of scattering across the pool at random.
//! `sha2` is already part of this crate's dependency stack; the seeded
//! walk replaces a plain priority-order iteration over upstreams, which
//! cannot provide that determinism.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::GatewayError;
use crate::nntp::types::{Article, MessageId, ServerDef};
use crate::pool::PoolHandle;

/// One upstream as seen by the dispatcher: its static definition (for the
/// posting-capability filter) and the pool that leases live connections to
/// it.
pub struct Upstream {
    pub def: ServerDef,
    pub pool: PoolHandle,
}

pub struct Dispatcher {
    upstreams: Vec<Upstream>,
    article_size_limit: u64,
}

/// Which NNTP command `get_article` should issue, and in what body form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// `HEAD` — headers only, no body.
    Head,
    /// `ARTICLE`, dot-decoded body (`/m/`).
    Decoded,
    /// `ARTICLE` with `WithDotEncodedBody` — body kept in wire dot-stuffed
    /// form, untouched (`/d/`).
    Raw,
}

/// Outcome of one fetch attempt against one upstream: whether the dispatcher
/// should advance to the next candidate server (`Retryable`, e.g. a
/// protocol-level response or a pool that couldn't hand out a connection at
/// all) or abort the whole request (`Fatal`, a transport error on an
/// already-acquired connection, or an oversized article).
enum FetchOutcome {
    Retryable(GatewayError),
    Fatal(GatewayError),
}

impl Dispatcher {
    pub fn new(upstreams: Vec<Upstream>, article_size_limit: u64) -> Self {
        Self {
            upstreams,
            article_size_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    /// Fetch an article by Message-ID, retrying across upstreams on failure.
    /// A transport-classified error (connection discarded) fails the whole
    /// request immediately per spec.md §4.3/§7 — only a protocol-level
    /// error (connection still healthy) or a failure to acquire a
    /// connection at all (that upstream's pool, not this request, is the
    /// problem) advances to the next candidate server.
    pub async fn get_article(
        &self,
        message_id: &MessageId,
        kind: FetchKind,
    ) -> Result<Article, GatewayError> {
        let n = self.upstreams.len();
        if n == 0 {
            return Err(GatewayError::NoServerAvailable);
        }

        let mut last_err = GatewayError::NoServerAvailable;

        for k in 0..n {
            let Some(idx) = select_server(message_id, k, n, |_| true) else {
                break;
            };
            let upstream = &self.upstreams[idx];

            match self.try_fetch(upstream, message_id, kind).await {
                Ok(article) => return Ok(article),
                Err(FetchOutcome::Retryable(err)) => {
                    tracing::warn!(
                        upstream = idx,
                        attempt = k,
                        error = %err,
                        "dispatch: fetch attempt failed, trying next upstream"
                    );
                    last_err = err;
                }
                Err(FetchOutcome::Fatal(err)) => {
                    tracing::warn!(
                        upstream = idx,
                        attempt = k,
                        error = %err,
                        "dispatch: fetch attempt hit a transport error, aborting retry"
                    );
                    return Err(err);
                }
            }
        }

        Err(last_err)
    }

    async fn try_fetch(
        &self,
        upstream: &Upstream,
        message_id: &MessageId,
        kind: FetchKind,
    ) -> Result<Article, FetchOutcome> {
        let mut lease = upstream
            .pool
            .get()
            .await
            .map_err(FetchOutcome::Retryable)?;
        let id = message_id.to_string();

        let result = match kind {
            FetchKind::Head => lease.client_mut().fetch_head(&id).await.map(response_to_article),
            FetchKind::Decoded => lease
                .client_mut()
                .fetch_article_binary(&id)
                .await
                .map(binary_response_to_article),
            FetchKind::Raw => lease
                .client_mut()
                .fetch_article_binary_dot_encoded(&id)
                .await
                .map(binary_response_to_article),
        };

        match result {
            Ok(article) => {
                // The assumed `nntp-rs` surface reads a whole response in
                // one shot (no chunked/length-limited reader to bound as it
                // arrives — see DESIGN.md), so the size cap can only be
                // enforced after the fact. A connection that handed back an
                // oversized article is treated as desynced and closed
                // rather than returned, per spec.md §7.
                if article.body.len() as u64 > self.article_size_limit {
                    lease.close();
                    return Err(FetchOutcome::Fatal(GatewayError::ArticleTooLarge));
                }
                lease.release();
                Ok(article)
            }
            Err(err) => {
                let gateway_err = classify_nntp_error(err);
                if gateway_err.closes_connection() {
                    lease.close();
                    Err(FetchOutcome::Fatal(gateway_err))
                } else {
                    lease.release();
                    Err(FetchOutcome::Retryable(gateway_err))
                }
            }
        }
    }

    /// POST a single attempt against a deterministically chosen
    /// posting-capable upstream. Unlike GET/HEAD, POST never retries: the
    /// client is expected to retry the whole request if it wants another
    /// upstream tried. `dot_encoded` selects `CmdPost(article,
    /// WithDotEncodedBody)` for `/d/`, whose request body is assumed already
    /// dot-stuffed and must be posted verbatim rather than re-encoded.
    pub async fn post_article(
        &self,
        message_id: &MessageId,
        article: &nntp_rs::Article,
        dot_encoded: bool,
    ) -> Result<(), GatewayError> {
        let n = self.upstreams.len();
        if n == 0 {
            return Err(GatewayError::NoServerAvailable);
        }

        let Some(idx) = select_server(message_id, 0, n, |i| self.upstreams[i].def.posting) else {
            return Err(GatewayError::NoServerAvailable);
        };

        let upstream = &self.upstreams[idx];
        let mut lease = upstream.pool.get().await?;

        let post_result = if dot_encoded {
            lease.client_mut().post_dot_encoded(article).await
        } else {
            lease.client_mut().post(article).await
        };

        match post_result {
            Ok(()) => {
                lease.release();
                Ok(())
            }
            Err(err) => {
                let gateway_err = classify_nntp_error(err);
                if gateway_err.closes_connection() {
                    lease.close();
                } else {
                    lease.release();
                }
                Err(gateway_err)
            }
        }
    }
}

/// Deterministically select the `k`-th upstream (after filtering) for this
/// Message-ID. `filter` excludes upstreams that cannot serve this request
/// (e.g. non-posting-capable servers for a POST). Returns `None` once fewer
/// than `k + 1` upstreams satisfy the filter.
pub fn select_server(
    message_id: &MessageId,
    k: usize,
    n: usize,
    filter: impl Fn(usize) -> bool,
) -> Option<usize> {
    if n == 0 {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(message_id.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[0..8]);
    let seed = u64::from_le_bytes(seed_bytes);

    let mut rng = StdRng::seed_from_u64(seed);
    let r: usize = rng.gen_range(0..n);

    let mut matches_seen = 0usize;
    for j in 0..n {
        let idx = (r + j) % n;
        if filter(idx) {
            if matches_seen == k {
                return Some(idx);
            }
            matches_seen += 1;
        }
    }
    None
}

fn response_to_article(response: nntp_rs::NntpResponse) -> Article {
    let mut article = Article::default();
    let mut in_body = false;
    for line in response.lines {
        if !in_body {
            if line.is_empty() {
                in_body = true;
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                article.push_header(name.trim(), value.trim());
            }
            continue;
        }
        article.body.extend_from_slice(line.as_bytes());
        article.body.push(b'\n');
    }
    article
}

fn binary_response_to_article(response: nntp_rs::NntpBinaryResponse) -> Article {
    let mut article = Article::default();
    let data = response.data;
    let separator = find_header_body_separator(&data);

    let (header_bytes, body_bytes) = match separator {
        Some(pos) => (&data[..pos.0], &data[pos.1..]),
        None => (&data[..], &[][..]),
    };

    let header_text = String::from_utf8_lossy(header_bytes);
    for line in header_text.lines() {
        if let Some((name, value)) = line.split_once(':') {
            article.push_header(name.trim(), value.trim());
        }
    }
    article.body = body_bytes.to_vec();
    article
}

/// Find the blank-line separator between headers and body. Returns the byte
/// offsets `(end_of_headers, start_of_body)`, handling both CRLF and bare-LF
/// line endings since upstreams are not guaranteed to normalize.
fn find_header_body_separator(data: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    if let Some(pos) = data.windows(2).position(|w| w == b"\n\n") {
        return Some((pos, pos + 2));
    }
    None
}

/// Classify an `nntp-rs` error as protocol-level (connection stays usable,
/// keep retrying the next upstream) or transport-level (connection must be
/// discarded).
pub fn classify_nntp_error(err: nntp_rs::NntpError) -> GatewayError {
    use nntp_rs::NntpError as E;
    match err {
        E::NoSuchArticle(_) => GatewayError::ArticleNotFound,
        E::PostingNotPermitted => GatewayError::PostingNotPermitted,
        E::PostingFailed(msg) => GatewayError::PostingFailed(msg),
        E::Protocol { code, message } => GatewayError::NntpProtocol { code, message },
        E::AuthFailed(msg) => GatewayError::NntpProtocol {
            code: 480,
            message: msg,
        },
        E::NoGroupSelected | E::InvalidArticleNumber => GatewayError::NntpProtocol {
            code: 412,
            message: err.to_string(),
        },
        E::Io(_) | E::Tls(_) | E::Timeout | E::ConnectionClosed => {
            GatewayError::Transport(err.to_string())
        }
        other => GatewayError::Transport(other.to_string()),
    }
}

/// Build upstreams (definition + freshly spawned pool) from configuration.
pub fn build_upstreams(
    servers: Vec<ServerDef>,
    idle_expiry: std::time::Duration,
) -> Vec<Upstream> {
    servers
        .into_iter()
        .map(|def| {
            let pool = crate::pool::spawn_pool(def.clone(), idle_expiry);
            Upstream { def, pool }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mid(s: &str) -> MessageId {
        MessageId::parse(s).unwrap()
    }

    #[test]
    fn select_server_is_deterministic() {
        let id = mid("abc123@example.com");
        let a = select_server(&id, 0, 5, |_| true);
        let b = select_server(&id, 0, 5, |_| true);
        assert_eq!(a, b);
    }

    #[test]
    fn select_server_varies_by_message_id() {
        let a = select_server(&mid("one@example.com"), 0, 8, |_| true);
        let b = select_server(&mid("two@example.com"), 0, 8, |_| true);
        // Not a hard guarantee for any two inputs, but this pair is known to
        // land on different starting indices, which is the property that
        // matters: selection is a function of the Message-ID, not constant.
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn select_server_retry_sequence_has_no_duplicates() {
        let id = mid("retry-sequence@example.com");
        let n = 6;
        let mut seen = std::collections::HashSet::new();
        for k in 0..n {
            let idx = select_server(&id, k, n, |_| true).unwrap();
            assert!(seen.insert(idx), "index {idx} repeated at k={k}");
        }
    }

    #[test]
    fn select_server_respects_filter() {
        let id = mid("filtered@example.com");
        // Only index 2 passes the filter; every k must resolve to it once,
        // then None once exhausted.
        let only_two = |i: usize| i == 2;
        assert_eq!(select_server(&id, 0, 5, only_two), Some(2));
        assert_eq!(select_server(&id, 1, 5, only_two), None);
    }

    #[test]
    fn select_server_empty_pool_is_none() {
        assert_eq!(select_server(&mid("x@example.com"), 0, 0, |_| true), None);
    }

    #[test]
    fn header_body_split_handles_crlf_and_lf() {
        let crlf = b"Subject: hi\r\nFrom: a@b\r\n\r\nbody text";
        let (end, start) = find_header_body_separator(crlf).unwrap();
        assert_eq!(&crlf[start..], b"body text");
        assert!(end < start);

        let lf = b"Subject: hi\nFrom: a@b\n\nbody text";
        let (_, start) = find_header_body_separator(lf).unwrap();
        assert_eq!(&lf[start..], b"body text");
    }
}
