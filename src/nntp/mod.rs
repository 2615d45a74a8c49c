//! NNTP data types and the upstream connection factory.
//!
//! The wire protocol itself (framing, dot-stuffing, command/response
//! encoding) is owned by the external `nntp-rs` crate; this module only
//! defines the gateway's own view of that data (`MessageId`, `Article`,
//! `ServerDef`) and the thin factory that turns a `ServerDef` into a live,
//! authenticated `nntp_rs::NntpClient`.

pub mod connect;
pub mod types;

pub use types::{Article, Header, MessageId, ServerDef};
