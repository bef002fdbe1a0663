//! Real-time session protocol: frames, hub, per-connection sessions, and
//! resource handlers.

pub mod handlers;
pub mod hub;
pub mod protocol;
pub mod session;
