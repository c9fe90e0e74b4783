//! HTTP gateway that turns inbound requests into `http_request` events and
//! replays the backend's streamed command protocol as the HTTP response.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
