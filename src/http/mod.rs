//! Server startup: plain HTTP or manual TLS, with graceful shutdown.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
