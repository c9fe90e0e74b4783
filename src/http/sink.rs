//! Axum-backed response sink.
//!
//! # Responsibilities
//! - Accumulate status, headers and cookies until the first flush
//! - Hand the response head to the waiting handler exactly once
//! - Stream body bytes to the client over a bounded channel
//! - Replace or abort the response on failure
//!
//! # Data Flow
//! ```text
//! dispatcher ──▶ StreamingSink ──(oneshot: Response head)──▶ handler
//!                      │
//!                      └──(mpsc: body chunks)──▶ axum Body ──▶ client
//! ```
//!
//! # Design Decisions
//! - A response finished before any flush is sent as one body with a
//!   known length
//! - Head mutations after commit are ignored with a warning, except
//!   `redirect`, which is an error
//! - Dropping the sink without finishing drops the head sender, which the
//!   handler reports as an execution failure

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use chrono::{Duration, Utc};
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::http::signing::CookieSigner;
use crate::protocol::cookie::{http_date, CookieExpiry, CookieSpec};
use crate::protocol::{ResponseSink, SinkError};

const BODY_CHANNEL_CAPACITY: usize = 16;
const SIGNED_COOKIE_DEFAULT_DAYS: f64 = 30.0;

type BodyChunk = Result<Bytes, std::io::Error>;

/// Response sink for one inbound request.
pub struct StreamingSink {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<(String, HeaderValue)>,
    buffer: BytesMut,
    head_tx: Option<oneshot::Sender<Response>>,
    body_tx: Option<mpsc::Sender<BodyChunk>>,
    finished: bool,
    signer: Option<CookieSigner>,
    request_cookies: Vec<String>,
}

impl StreamingSink {
    /// Create a sink and the receiver on which the response head arrives.
    ///
    /// `request_headers` supplies the cookie names `clear_all_cookie` acts on.
    pub fn new(
        signer: Option<CookieSigner>,
        request_headers: &HeaderMap,
    ) -> (Self, oneshot::Receiver<Response>) {
        let (head_tx, head_rx) = oneshot::channel();
        let sink = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            buffer: BytesMut::new(),
            head_tx: Some(head_tx),
            body_tx: None,
            finished: false,
            signer,
            request_cookies: request_cookie_names(request_headers),
        };
        (sink, head_rx)
    }

    /// Whether the status line and headers were handed to the client.
    pub fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.finished {
            Err(SinkError::Finished)
        } else {
            Ok(())
        }
    }

    fn build_head(&mut self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        for (_, cookie) in self.cookies.drain(..) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }

    fn send_head(&mut self, response: Response) -> Result<(), SinkError> {
        let head_tx = self.head_tx.take().ok_or(SinkError::HeadersCommitted("send headers"))?;
        head_tx.send(response).map_err(|_| SinkError::ClientGone)
    }

    /// Send the head with a streaming body.
    fn commit(&mut self) -> Result<(), SinkError> {
        let (body_tx, body_rx) = mpsc::channel::<BodyChunk>(BODY_CHANNEL_CAPACITY);
        let body = Body::from_stream(stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));
        let response = self.build_head(body);
        self.body_tx = Some(body_tx);
        self.send_head(response)
    }

    async fn send_buffer(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        match &self.body_tx {
            Some(tx) => tx.send(Ok(chunk)).await.map_err(|_| SinkError::ClientGone),
            None => Err(SinkError::ClientGone),
        }
    }

    fn store_cookie(&mut self, name: &str, rendered: String) -> Result<(), SinkError> {
        let value = HeaderValue::from_str(&rendered)
            .map_err(|_| SinkError::InvalidCookie(name.to_string()))?;
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Returns false (and logs) when the head is already on the wire.
    fn head_mutable(&self, what: &'static str) -> bool {
        if self.is_committed() {
            tracing::warn!(command = what, "Ignoring head mutation after headers were sent");
            false
        } else {
            true
        }
    }
}

#[async_trait]
impl ResponseSink for StreamingSink {
    fn set_status(&mut self, code: u16) -> Result<(), SinkError> {
        self.ensure_open()?;
        let status = StatusCode::from_u16(code).map_err(|_| SinkError::InvalidStatus(code))?;
        if self.head_mutable("set_status") {
            self.status = status;
        }
        Ok(())
    }

    fn set_header(&mut self, key: &str, value: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| SinkError::InvalidHeader(key.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| SinkError::InvalidHeader(key.to_string()))?;
        if self.head_mutable("set_header") {
            self.headers.insert(name, value);
        }
        Ok(())
    }

    fn set_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError> {
        self.ensure_open()?;
        if self.head_mutable("set_cookie") {
            let rendered = cookie.render(Utc::now());
            self.store_cookie(&cookie.name, rendered)?;
        }
        Ok(())
    }

    fn set_signed_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError> {
        self.ensure_open()?;
        let signer = self.signer.as_ref().ok_or(SinkError::SigningUnavailable)?;
        if !self.head_mutable("set_cookie") {
            return Ok(());
        }

        let now = Utc::now();
        let mut signed = cookie.clone();
        signed.value = signer.sign(&cookie.name, &cookie.value, now.timestamp());
        if signed.expires.is_none() && signed.expires_days.is_none() {
            signed.expires_days = Some(SIGNED_COOKIE_DEFAULT_DAYS);
        }
        let rendered = signed.render(now);
        self.store_cookie(&cookie.name, rendered)
    }

    fn clear_cookie(&mut self, name: &str, domain: Option<&str>, path: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        if !self.head_mutable("clear_cookie") {
            return Ok(());
        }
        let now = Utc::now();
        let expired = CookieSpec {
            name: name.to_string(),
            value: String::new(),
            domain: domain.map(str::to_string),
            path: path.to_string(),
            expires: Some(CookieExpiry::Date(http_date(now - Duration::days(365)))),
            expires_days: None,
            max_age: None,
            httponly: false,
            samesite: None,
            secure: false,
        };
        self.store_cookie(name, expired.render(now))
    }

    fn clear_all_cookies(&mut self, domain: Option<&str>, path: &str) -> Result<(), SinkError> {
        self.ensure_open()?;
        let names = self.request_cookies.clone();
        for name in names {
            self.clear_cookie(&name, domain, path)?;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.ensure_open()?;
        if !self.is_committed() {
            self.commit()?;
        }
        self.send_buffer().await
    }

    async fn redirect(&mut self, url: &str, permanent: bool) -> Result<(), SinkError> {
        self.ensure_open()?;
        if self.is_committed() {
            return Err(SinkError::HeadersCommitted("redirect"));
        }
        let location =
            HeaderValue::from_str(url).map_err(|_| SinkError::InvalidHeader("Location".into()))?;
        self.status = if permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };
        self.headers.insert(header::LOCATION, location);
        self.finish().await
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.ensure_open()?;
        self.finished = true;

        if self.is_committed() {
            let result = self.send_buffer().await;
            self.body_tx = None;
            return result;
        }

        let body = Body::from(self.buffer.split().freeze());
        let response = self.build_head(body);
        self.send_head(response)
    }

    async fn fail(&mut self, status: u16, message: &str) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(tx) = self.body_tx.take() {
            let error = std::io::Error::other(message.trim_end().to_string());
            let _ = tx.send(Err(error)).await;
            return;
        }

        self.buffer.clear();
        self.cookies.clear();
        self.headers.clear();
        self.status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        let response = self.build_head(Body::from(message.to_string()));
        if self.send_head(response).is_err() {
            tracing::debug!("Client went away before the failure response was sent");
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

fn request_cookie_names(headers: &HeaderMap) -> Vec<String> {
    let mut names = Vec::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            let name = pair.split_once('=').map(|(n, _)| n).unwrap_or(pair).trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}
