//! HTTP/HTTPS server startup logic.
//!
//! Supports two modes, per spec.md §6: plain HTTP, or manual TLS when both
//! `cert_file` and `key_file` are configured. There is no ACME branch — the
//! gateway's Config document only ever names a static certificate/key pair.

use std::net::SocketAddr;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;

use crate::config::GatewayConfig;

use super::shutdown;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid host/port: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("failed to load TLS certificate/key: {0}")]
    TlsConfig(std::io::Error),

    #[error("server error: {0}")]
    Server(std::io::Error),
}

/// Start the HTTP/HTTPS server. Blocks until a shutdown signal is received
/// and in-flight connections have drained.
pub async fn start_server(app: Router, config: &GatewayConfig) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let handle = Handle::new();

    match (&config.cert_file, &config.key_file) {
        (Some(cert_path), Some(key_path)) => {
            start_tls_server(app, addr, cert_path, key_path, handle).await
        }
        _ => start_plain_server(app, addr, handle).await,
    }
}

async fn start_plain_server(app: Router, addr: SocketAddr, handle: Handle) -> Result<(), ServerError> {
    tracing::info!(%addr, "server: starting plain HTTP");

    shutdown::setup_shutdown_handler(handle.clone());

    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ServerError::Server)
}

async fn start_tls_server(
    app: Router,
    addr: SocketAddr,
    cert_path: &str,
    key_path: &str,
    handle: Handle,
) -> Result<(), ServerError> {
    tracing::info!(%addr, cert = %cert_path, key = %key_path, "server: starting HTTPS (manual certificate)");

    let rustls_config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(ServerError::TlsConfig)?;

    shutdown::setup_shutdown_handler(handle.clone());
    shutdown::setup_reload_handler(rustls_config.clone(), cert_path.to_string(), key_path.to_string());

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ServerError::Server)
}
