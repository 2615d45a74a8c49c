//! usenet-gateway — an HTTP gateway to Usenet articles, addressed by
//! Message-ID.
//!
//! Clients upload opaque payloads by POSTing to `/m/<id>.<ext>` and later
//! retrieve them by the same Message-ID; the gateway multiplexes requests
//! over a pool of authenticated NNTP sessions spread across one or more
//! upstream providers. See `DESIGN.md` for how each module is grounded.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod nntp;
pub mod pool;
pub mod range;
pub mod state;
