//! Data types shared across the pool, dispatcher, and request handler.

use std::fmt;

use nntp_rs::validation::validate_message_id;

use crate::error::GatewayError;

/// An opaque, NNTP-syntax-validated Usenet Message-ID.
///
/// Stored without the surrounding angle brackets; `Display` restores them so
/// callers never have to remember which representation is in play.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Parse a Message-ID, accepting it with or without angle brackets.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let bracketed = if raw.starts_with('<') && raw.ends_with('>') {
            raw.to_string()
        } else {
            format!("<{raw}>")
        };

        validate_message_id(&bracketed)
            .map_err(|_| GatewayError::BadMessageId(raw.to_string()))?;

        let stripped = bracketed
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string();
        Ok(Self(stripped))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local part before `@`, used when synthesizing a POST's `Subject`
    /// header (see `synthesize_subject` in `handler::post`).
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// A single NNTP header line, preserved in original case for display but
/// compared case-insensitively per RFC 5536.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn name_eq_ignore_ascii_case(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// An Usenet article: an ordered, case-insensitive-keyed multimap of headers
/// plus a body bounded by `ArticleSizeLimit`. Never cached across requests.
#[derive(Debug, Clone, Default)]
pub struct Article {
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl Article {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name_eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }
}

/// Definition of a single upstream NNTP server, as read from configuration.
#[derive(Debug, Clone)]
pub struct ServerDef {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub tls: bool,
    pub posting: bool,
    pub connections: u32,
}

impl ServerDef {
    pub fn has_credentials(&self) -> bool {
        self.user.is_some() && self.pass.is_some()
    }
}
