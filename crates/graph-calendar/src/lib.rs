//! Microsoft Graph calendar client.
//!
//! Provides the calendar side of meeting scheduling: busy-interval queries,
//! event create/update/cancel, a sync listing, and pure free-slot derivation.
//! Transient provider failures (network, 5xx, 429) are retried with
//! exponential backoff; other 4xx responses surface immediately.

pub mod client;
pub mod config;
pub mod error;
pub mod slots;
pub mod token;
pub mod types;

pub use client::{CalendarApi, GraphCalendarClient};
pub use config::CalendarConfig;
pub use error::CalendarError;
pub use slots::{available_slots, SlotRules};
pub use types::{BusyInterval, CalendarEvent, CreatedEvent, EventPatch, Slot};
