//! Response mutation capability targeted by the dispatcher.

use async_trait::async_trait;

use crate::protocol::cookie::CookieSpec;
use crate::protocol::error::SinkError;

/// The still-open inbound response, as seen by the command stream.
///
/// Once [`is_finished`](ResponseSink::is_finished) returns true every
/// mutating method must fail with [`SinkError::Finished`].
#[async_trait]
pub trait ResponseSink: Send {
    fn set_status(&mut self, code: u16) -> Result<(), SinkError>;

    fn set_header(&mut self, key: &str, value: &str) -> Result<(), SinkError>;

    /// Plain cookie path.
    fn set_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError>;

    /// Signed cookie path.
    fn set_signed_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError>;

    fn clear_cookie(&mut self, name: &str, domain: Option<&str>, path: &str) -> Result<(), SinkError>;

    /// Clear every cookie the client sent, scoped to `domain`/`path`.
    fn clear_all_cookies(&mut self, domain: Option<&str>, path: &str) -> Result<(), SinkError>;

    /// Append bytes to the buffered body.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Send the head (if not yet sent) and any buffered body bytes.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Redirect and finish the response.
    async fn redirect(&mut self, url: &str, permanent: bool) -> Result<(), SinkError>;

    /// Flush and close the response.
    async fn finish(&mut self) -> Result<(), SinkError>;

    /// Terminate after a transport or protocol failure.
    ///
    /// If nothing has reached the client yet, the buffered response is
    /// replaced by `status` with `message` as body. Otherwise the body
    /// stream is aborted.
    async fn fail(&mut self, status: u16, message: &str);

    fn is_finished(&self) -> bool;
}
