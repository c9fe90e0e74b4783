//! Gateway configuration.
//!
//! A TOML file is deserialized into [`GatewayConfig`], checked as a whole
//! by `validation`, and rejected with every problem listed at once. Every
//! section has defaults, so an empty file is a valid configuration.
//!
//! While running, `watcher` re-reads the file on change and publishes the
//! new version. Only the route table picks it up; listener, timeout and
//! cookie settings apply at startup.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CookieConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, RouteConfig,
    SecurityConfig, TimeoutConfig,
};
