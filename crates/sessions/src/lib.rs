//! Durable session storage for the hub: one JSON file per session, atomic
//! writes, and a per-session lock table so concurrent saves can't race.

pub mod store;

pub use store::{SessionError, SessionRecord, SessionStore, SessionSummary, MAX_MESSAGES};
