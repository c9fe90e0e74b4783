//! Outbound streaming call to the execution backend.
//!
//! # Responsibilities
//! - POST the serialized envelope to the resolved endpoint
//! - Feed every received chunk through a fresh StreamDecoder
//! - Dispatch decoded commands in arrival order as they arrive
//! - Finalize the response on completion, or fail it on error
//!
//! # Design Decisions
//! - At-most-once: the backend call is never retried
//! - Connect and total timeouts come from configuration; the total
//!   timeout covers the whole streamed body
//! - Commands already applied stay applied when the call fails
//! - A non-2xx backend status is a failure, but commands streamed before
//!   it was detected still apply

use std::time::Duration;

use axum::http::{header, StatusCode};
use futures_util::StreamExt;
use thiserror::Error;
use url::Url;

use crate::config::TimeoutConfig;
use crate::error::EXECUTION_FAILED_BODY;
use crate::observability::metrics;
use crate::protocol::dispatcher::dispatch_line;
use crate::protocol::envelope::Envelope;
use crate::protocol::{Dispatch, ProtocolError, ResponseSink, StreamDecoder};

const ENVELOPE_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Errors during the outbound call.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("backend call timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("backend transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("backend returned status {0}")]
    BackendStatus(StatusCode),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ForwardError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Encode(_) => "encode",
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Transport(_) => "transport",
            ForwardError::BackendStatus(_) => "backend_status",
            ForwardError::Protocol(e) => e.kind(),
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout(e)
        } else {
            ForwardError::Transport(e)
        }
    }
}

/// How a forwarded stream ended.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// The backend sent `finish` (or the response was finished by a redirect).
    Finished { commands: usize },
    /// The backend closed the stream.
    Completed { commands: usize },
    /// The call or the command stream failed; the sink was failed.
    Failed(ForwardError),
}

/// Issues outbound calls. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    client: reqwest::Client,
}

impl RequestForwarder {
    /// Build a forwarder with the configured timeouts.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Forward one envelope and replay the backend's commands onto `sink`.
    ///
    /// The sink is always finished when this returns.
    pub async fn forward<S>(&self, envelope: &Envelope, endpoint: &Url, sink: &mut S) -> ForwardOutcome
    where
        S: ResponseSink + ?Sized,
    {
        metrics::stream_started();
        let outcome = match self.stream(envelope, endpoint, sink).await {
            Ok(outcome) => {
                if !sink.is_finished() {
                    if let Err(e) = sink.finish().await {
                        tracing::debug!(event_id = %envelope.event_id, error = %e, "Failed to finalize response");
                    }
                }
                outcome
            }
            Err(e) => {
                tracing::error!(
                    event_id = %envelope.event_id,
                    endpoint = %endpoint,
                    error = %e,
                    "Story execution failed"
                );
                metrics::record_stream_failure(e.kind());
                sink.fail(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), EXECUTION_FAILED_BODY).await;
                ForwardOutcome::Failed(e)
            }
        };
        metrics::stream_ended();
        outcome
    }

    async fn stream<S>(&self, envelope: &Envelope, endpoint: &Url, sink: &mut S) -> Result<ForwardOutcome, ForwardError>
    where
        S: ResponseSink + ?Sized,
    {
        let body = serde_json::to_vec(envelope)?;

        tracing::debug!(event_id = %envelope.event_id, endpoint = %endpoint, "Forwarding envelope");

        let response = self
            .client
            .post(endpoint.clone())
            .header(header::CONTENT_TYPE, ENVELOPE_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let mut chunks = response.bytes_stream();
        let mut decoder = StreamDecoder::new();
        let mut commands = 0usize;
        let mut finished = false;

        'stream: while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for line in decoder.feed(&chunk) {
                let line = line?;
                let result = dispatch_line(&line, sink).await;
                commands += 1;
                match result? {
                    Dispatch::Finish => {
                        tracing::debug!(event_id = %envelope.event_id, commands, "Backend finished the response");
                        finished = true;
                        break 'stream;
                    }
                    Dispatch::Continue if sink.is_finished() => {
                        finished = true;
                        break 'stream;
                    }
                    Dispatch::Continue => {}
                }
            }
        }

        let dropped = decoder.finish();
        if dropped > 0 {
            tracing::debug!(event_id = %envelope.event_id, bytes = dropped, "Discarding unterminated trailing data");
        }

        if !status.is_success() {
            return Err(ForwardError::BackendStatus(status));
        }

        metrics::record_commands(commands);
        if finished {
            Ok(ForwardOutcome::Finished { commands })
        } else {
            Ok(ForwardOutcome::Completed { commands })
        }
    }
}
