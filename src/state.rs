//! Shared application state for request handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;

/// Shared application state, cheap to clone across handlers via Arc-wrapped
/// fields. The dispatcher owns every upstream's pool; handlers never talk to
/// a pool directly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: GatewayConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        }
    }
}
