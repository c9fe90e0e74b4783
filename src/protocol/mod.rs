//! Streaming protocol engine.
//!
//! # Data Flow
//! ```text
//! Inbound request (parts + body)
//!     → envelope.rs (one event envelope per request)
//!     → [forwarder POSTs envelope to the execution backend]
//!
//! Backend byte stream (arbitrary chunking)
//!     → decoder.rs (frame on 0x0A, buffer the unterminated tail)
//!     → command.rs (JSON line → closed Command enum)
//!     → dispatcher.rs (replay onto a ResponseSink, strictly in order)
//!     → sink.rs (status / headers / cookies / body / termination)
//! ```
//!
//! # Design Decisions
//! - Pure logic only: no sockets, no runtime handles
//! - One StreamDecoder per outbound call, never shared
//! - Command names are matched once at decode time; everything after
//!   works with the typed enum

pub mod command;
pub mod cookie;
pub mod decoder;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod sink;

pub use command::Command;
pub use cookie::{CookieExpiry, CookieSpec};
pub use decoder::StreamDecoder;
pub use dispatcher::{dispatch, Dispatch};
pub use envelope::{Envelope, EnvelopeData};
pub use error::{EnvelopeError, ProtocolError, SinkError};
pub use sink::ResponseSink;
