//! The dispatch fabric's module root: the shared [`Hub`] handle plus the
//! worker-facing WebSocket endpoint that feeds it `register`/`tool_result`
//! frames.

pub mod state;
pub mod ws;

pub use state::{Hub, SharedConversation, WorkerInfo, WorkerSender, DISPATCH_TIMEOUT};
