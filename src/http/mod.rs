//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! client request
//!     → server.rs (axum router, route resolution, envelope)
//!     → forwarder.rs (POST envelope to backend, feed response lines)
//!     → protocol dispatcher (commands)
//!     → sink.rs (status, headers, cookies, body chunks)
//!     → client response
//! ```

pub mod forwarder;
pub mod request;
pub mod server;
pub mod signing;
pub mod sink;

pub use forwarder::{ForwardError, ForwardOutcome, RequestForwarder};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
pub use signing::CookieSigner;
pub use sink::StreamingSink;
