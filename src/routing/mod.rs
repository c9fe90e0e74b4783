//! Route resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request head (method, host, path)
//!     → router.rs (priority-ordered route scan)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: ResolvedRoute { name, endpoint } or None
//!
//! Route Compilation (startup and hot reload):
//!     RouteConfig[]
//!     → Parse endpoints, compile matchers
//!     → Sort by priority
//!     → Freeze as immutable RouteTable, published via ArcSwap
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; reload swaps the whole table
//! - First match wins (ordered by priority, then declaration order)
//! - Resolution never mutates anything; it is shared read-only

pub mod matcher;
pub mod router;

use axum::http::request::Parts;
use url::Url;

pub use router::RouteTable;

/// Outcome of a successful route lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    /// Route identifier for logging/metrics.
    pub name: String,
    /// Execution endpoint the envelope is POSTed to.
    pub endpoint: Url,
}

/// Maps an inbound request head to a backend endpoint.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, parts: &Parts) -> Option<ResolvedRoute>;
}
