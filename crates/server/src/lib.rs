//! HTTP/WebSocket server library.
//!
//! The binary in `main.rs` wires production dependencies; tests assemble
//! [`state::AppState`] with doubles and drive the same router.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::{AppState, WebhookSecrets};
