//! A multiplexing proxy that presents several LSP backends to an editor as a single
//! language server.

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod engine;
pub mod message;
pub mod router;
pub mod transport;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
