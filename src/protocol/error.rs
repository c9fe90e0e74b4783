//! Error definitions for request translation and the command stream.

use thiserror::Error;

/// Failures while turning an inbound request into an envelope.
///
/// All of these are raised before the backend is contacted.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A query string key or value was not valid UTF-8 after percent-decoding.
    #[error("query parameter is not valid UTF-8: {0}")]
    Decode(String),

    /// The request declared a JSON content type but the body did not parse.
    #[error("malformed JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// The inbound body could not be read (client abort or size limit).
    #[error("failed to read request body: {0}")]
    BodyRead(String),
}

/// Protocol violations in the backend's command stream.
///
/// Any of these aborts processing of the remaining stream.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A framed line was not valid UTF-8.
    #[error("command line is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The line was not JSON, lacked `command`, or carried bad `data`.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// The `command` field named something outside the protocol.
    #[error("{0} is not implemented")]
    UnsupportedCommand(String),

    /// The sink refused a mutation.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ProtocolError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::InvalidUtf8(_) => "invalid_utf8",
            ProtocolError::MalformedCommand(_) => "malformed_command",
            ProtocolError::UnsupportedCommand(_) => "unsupported_command",
            ProtocolError::Sink(_) => "sink",
        }
    }
}

/// Errors raised by a [`ResponseSink`](crate::protocol::ResponseSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The response was already finished; no further mutation is allowed.
    #[error("response already finished")]
    Finished,

    /// The status line and headers were already sent to the client.
    #[error("cannot {0} after headers have been sent")]
    HeadersCommitted(&'static str),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("invalid cookie: {0}")]
    InvalidCookie(String),

    /// A signed cookie was requested but no secret is configured.
    #[error("signed cookies require cookies.secret to be configured")]
    SigningUnavailable,

    /// The inbound client went away; nothing can be delivered anymore.
    #[error("client disconnected")]
    ClientGone,
}
