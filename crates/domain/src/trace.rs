use serde::Serialize;

/// Structured trace events emitted across the hub workspace, logged as a
/// single JSON field on a `tracing::info!` line so they stay greppable in
/// both human and machine log sinks.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
    },
    SessionSaved {
        session_id: String,
        message_count: usize,
    },
    SessionDeleted {
        session_id: String,
    },
    SessionCleared {
        session_id: String,
    },
    WorkerRegistered {
        worker_id: String,
        tool_count: usize,
    },
    WorkerDisconnected {
        worker_id: String,
    },
    ToolDispatched {
        call_id: String,
        tool_name: String,
        worker_id: String,
    },
    ToolTimedOut {
        call_id: String,
        tool_name: String,
        worker_id: String,
    },
    TurnStarted {
        session_id: Option<String>,
    },
    TurnCompleted {
        session_id: Option<String>,
        stop_reason: String,
    },
    TurnCancelled {
        session_id: Option<String>,
    },
    PoolWorkerAdded {
        worker_id: String,
        port: u16,
    },
    PoolWorkerRemoved {
        worker_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "hub_event");
    }
}
