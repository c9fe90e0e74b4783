//! Process lifecycle.
//!
//! SIGINT or SIGTERM fires [`Shutdown`]; the server stops accepting
//! connections and lets open response streams run to completion.

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
