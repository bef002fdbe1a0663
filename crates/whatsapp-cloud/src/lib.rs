//! WhatsApp Cloud API client.
//!
//! This crate covers both directions of the messaging boundary:
//!
//! - **Outbound:** text and media sends through the Cloud API `/messages`
//!   endpoint, with rate-limit-aware retries ([`WhatsAppClient`]).
//! - **Inbound:** webhook payload types ([`webhook`]) and HMAC signature
//!   verification ([`signature`]).
//!
//! The client never touches persistent storage; delivery failures surface
//! as typed errors for the orchestrator to record.

pub mod client;
pub mod config;
pub mod error;
pub mod signature;
pub mod webhook;

pub use client::{SendOutcome, WhatsAppClient};
pub use config::WhatsAppConfig;
pub use error::WhatsAppError;
pub use webhook::{InboundFragment, WebhookPayload};
