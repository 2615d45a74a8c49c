//! Connection factory: dials a single upstream and authenticates it.
//!
//! The server definition carries an explicit TLS flag (spec.md §3), so
//! unlike an opportunistic try-TLS-then-fall-back-to-plain dialer, this
//! factory dials exactly what the definition says and treats a mismatch
//! between "TLS required" and "TLS failed" as a transport error, not a
//! silent downgrade.

use std::sync::Arc;

use nntp_rs::{NntpClient, ServerConfig};

use crate::error::GatewayError;
use crate::nntp::types::ServerDef;

/// Dial and, if credentials are configured, authenticate against one
/// upstream server. The returned client is ready for ARTICLE/HEAD/STAT/POST.
#[tracing::instrument(skip(server), fields(host = %server.host, port = server.port))]
pub async fn dial(server: &ServerDef) -> Result<NntpClient, GatewayError> {
    let config = Arc::new(ServerConfig {
        host: server.host.clone(),
        port: server.port,
        tls: server.tls,
        allow_insecure_tls: false,
        username: server.user.clone().unwrap_or_default(),
        password: server.pass.clone().unwrap_or_default(),
    });

    let mut client = NntpClient::connect(config)
        .await
        .map_err(classify_connect_error)?;

    if server.has_credentials() {
        client
            .authenticate()
            .await
            .map_err(classify_connect_error)?;
    }

    tracing::debug!("nntp: connection established");
    Ok(client)
}

/// At connect time every failure is transport-level: there is no connection
/// yet to distinguish "this connection is still good, the server just said
/// no" from "this connection is unusable." Authentication failure is the one
/// exception worth a 502-shaped message, still closing the attempt.
fn classify_connect_error(err: nntp_rs::NntpError) -> GatewayError {
    GatewayError::Transport(err.to_string())
}
