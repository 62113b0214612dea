//! `sa-hub` — the dispatch fabric and agent loop fronting an LLM provider.
//!
//! A [`hub::Hub`] accepts worker WebSocket connections, builds a dynamic
//! tool registry from their `register` frames, and routes tool-use requests
//! emitted by a [`conversation::Conversation`] back out to whichever worker
//! currently serves that tool. [`agent`] drives the turn loop (blocking or
//! streaming) on top of that, and [`cancel::CancelToken`] gives the
//! streaming mode a way to interrupt an in-flight turn.

pub mod agent;
pub mod api;
pub mod cancel;
pub mod conversation;
pub mod hub;
pub mod state;
