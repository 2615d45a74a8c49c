//! usenet-gateway binary entry point: load configuration, build the
//! dispatcher and its per-upstream pools, assemble the router, and serve.

use std::time::Duration;

use axum::middleware as axum_middleware;
use axum::Router;
use clap::Parser;

use usenet_gateway::config::{GatewayConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use usenet_gateway::dispatch::{build_upstreams, Dispatcher};
use usenet_gateway::handler::build_router;
use usenet_gateway::middleware::{global_headers_layer, request_id_layer};
use usenet_gateway::nntp::types::ServerDef;
use usenet_gateway::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "usenet-gateway", about = "HTTP gateway to Usenet articles")]
struct Cli {
    /// Path to the gateway's TOML configuration document.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Directory served for any URL that does not match /m/, /d/, /h/.
    #[arg(long, default_value = "static")]
    static_dir: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .json()
        .init();

    let config = match GatewayConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %cli.config, "startup: failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.host,
        port = config.port,
        servers = config.nntp_servers.len(),
        "startup: configuration loaded"
    );

    let idle_expiry = Duration::from_secs(config.idle_conn_expiry_secs);
    let server_defs: Vec<ServerDef> = config.nntp_servers.iter().map(ServerDef::from).collect();
    let upstreams = build_upstreams(server_defs, idle_expiry);
    let dispatcher = Dispatcher::new(upstreams, config.article_size_limit);

    let state = AppState::new(config.clone(), dispatcher);

    let app: Router = build_router(state, &cli.static_dir)
        .layer(axum_middleware::from_fn(global_headers_layer))
        .layer(axum_middleware::from_fn(request_id_layer));

    if let Err(err) = usenet_gateway::http::start_server(app, &config).await {
        tracing::error!(error = %err, "startup: server failed to start or exited with an error");
        std::process::exit(1);
    }
}
