//! The dispatch fabric: the dynamic tool registry built from worker
//! registrations, session-affinity-aware round-robin routing, busy
//! tracking, and the 120s dispatch timeout.
//!
//! All mutable state lives behind one [`parking_lot::Mutex`], matching the
//! distilled spec's "serialize all hub state through one mutex or an
//! actor" requirement for implementations that aren't a true
//! single-threaded event loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use sa_domain::tool::ToolDefinition;
use sa_domain::trace::TraceEvent;

use crate::conversation::Conversation;

/// A conversation whose tool registry the hub keeps in sync as workers
/// come and go — used for long-lived (streaming or session-bound)
/// conversations, which can outlive the worker that originally served one
/// of their tools.
pub type SharedConversation = Arc<tokio::sync::Mutex<Conversation>>;

/// Hard per-dispatch timeout. No tool call may outlive this — its promise
/// is abandoned and the caller is told it timed out.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// A connected worker's outbound channel: frames pushed here are written
/// to its WebSocket by the connection task that owns the socket.
pub type WorkerSender = tokio::sync::mpsc::UnboundedSender<String>;

#[derive(Default)]
struct HubState {
    worker_senders: HashMap<String, WorkerSender>,
    tool_to_workers: HashMap<String, Vec<String>>,
    tool_rr_index: HashMap<String, usize>,
    /// Ordered so `/api/workers`-adjacent schema listings are stable;
    /// exactly one entry per live tool name.
    tool_schemas: Vec<ToolDefinition>,
    session_affinity: HashMap<String, String>,
    pending: HashMap<String, oneshot::Sender<String>>,
    call_to_worker: HashMap<String, String>,
    busy_workers: HashSet<String>,
    /// Long-lived conversations that need their tool registry patched up
    /// when a worker disconnects. Weak so a closed client socket doesn't
    /// keep its conversation alive through this list.
    live_conversations: Vec<Weak<tokio::sync::Mutex<Conversation>>>,
}

/// A worker registration snapshot, as reported by `/api/workers`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub tools: Vec<String>,
    pub status: &'static str,
    pub sessions: Vec<String>,
}

/// The dispatch fabric. Cheaply cloneable; every clone shares the same
/// underlying state.
#[derive(Clone)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Number of currently connected workers.
    pub fn worker_count(&self) -> usize {
        self.state.lock().worker_senders.len()
    }

    /// Every currently-known tool schema, across all connected workers.
    pub fn tool_schemas(&self) -> Vec<ToolDefinition> {
        self.state.lock().tool_schemas.clone()
    }

    /// `/api/workers`: per-worker tool lists, busy/idle status, and the
    /// sessions currently affine to each worker.
    pub fn workers_info(&self) -> Vec<WorkerInfo> {
        let state = self.state.lock();
        let mut by_worker: HashMap<&str, Vec<String>> = HashMap::new();
        for (tool_name, worker_ids) in &state.tool_to_workers {
            for wid in worker_ids {
                if state.worker_senders.contains_key(wid) {
                    by_worker.entry(wid.as_str()).or_default().push(tool_name.clone());
                }
            }
        }
        let mut sessions_by_worker: HashMap<&str, Vec<String>> = HashMap::new();
        for (sid, wid) in &state.session_affinity {
            sessions_by_worker.entry(wid.as_str()).or_default().push(sid.clone());
        }
        by_worker
            .into_iter()
            .map(|(wid, mut tools)| {
                tools.sort();
                WorkerInfo {
                    worker_id: wid.to_string(),
                    tools,
                    status: if state.busy_workers.contains(wid) { "busy" } else { "idle" },
                    sessions: sessions_by_worker.get(wid).cloned().unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Register the connection's outbound sender. Must be called before
    /// the first frame is processed.
    pub fn connect_worker(&self, worker_id: &str, sender: WorkerSender) {
        self.state.lock().worker_senders.insert(worker_id.to_string(), sender);
    }

    /// Track a long-lived conversation so a future worker disconnect can
    /// prune its tool registry. Ephemeral per-request conversations (the
    /// `/prompt` and `/sessions/{id}/prompt` endpoints) don't need this —
    /// they complete before a mid-call disconnect could matter.
    pub fn track_conversation(&self, conv: &SharedConversation) {
        let mut state = self.state.lock();
        state.live_conversations.retain(|w| w.strong_count() > 0);
        state.live_conversations.push(Arc::downgrade(conv));
    }

    /// Apply a `register` frame: add the worker to every tool's worker
    /// list, and for tool names new to the hub, record the schema.
    /// Returns the set of tool names that were new (the caller installs a
    /// dispatcher for each on its bootstrap conversation).
    pub fn register_tools(&self, worker_id: &str, tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        let mut state = self.state.lock();
        let mut newly_registered = Vec::new();
        for schema in tools {
            let name = schema.name.clone();
            let workers = state.tool_to_workers.entry(name.clone()).or_default();
            if !workers.contains(&worker_id.to_string()) {
                workers.push(worker_id.to_string());
            }
            if !state.tool_schemas.iter().any(|s| s.name == name) {
                state.tool_schemas.push(schema.clone());
                state.tool_rr_index.insert(name, 0);
                newly_registered.push(schema);
            }
        }
        TraceEvent::WorkerRegistered {
            worker_id: worker_id.to_string(),
            tool_count: newly_registered.len(),
        }
        .emit();
        newly_registered
    }

    /// A `tool_result` frame arrived: fulfill the pending promise and
    /// clear busy-accounting for its worker if this was its last call.
    pub fn complete_call(&self, call_id: &str, content: String) {
        let mut state = self.state.lock();
        if let Some(worker_id) = state.call_to_worker.remove(call_id) {
            let still_busy = state.call_to_worker.values().any(|w| w == &worker_id);
            if !still_busy {
                state.busy_workers.remove(&worker_id);
            }
        }
        if let Some(tx) = state.pending.remove(call_id) {
            let _ = tx.send(content);
        }
    }

    /// A worker's socket closed: purge every trace of it from hub state,
    /// then drop any now-orphaned tool from every tracked live
    /// conversation's registry. Outstanding `pending` promises for calls
    /// this worker owed a result for are deliberately left untouched —
    /// they time out on their own 120s deadline.
    pub async fn disconnect_worker(&self, worker_id: &str) {
        let (orphaned, live) = {
            let mut state = self.state.lock();
            state.worker_senders.remove(worker_id);

            let mut orphaned = Vec::new();
            let tool_names: Vec<String> = state.tool_to_workers.keys().cloned().collect();
            for name in tool_names {
                let workers = state.tool_to_workers.get_mut(&name).unwrap();
                workers.retain(|w| w != worker_id);
                if workers.is_empty() {
                    state.tool_to_workers.remove(&name);
                    state.tool_rr_index.remove(&name);
                    state.tool_schemas.retain(|s| s.name != name);
                    orphaned.push(name);
                }
            }

            state.session_affinity.retain(|_, w| w != worker_id);
            state.busy_workers.remove(worker_id);
            state.call_to_worker.retain(|_, w| w != worker_id);

            let live = state.live_conversations.clone();
            (orphaned, live)
        };

        TraceEvent::WorkerDisconnected {
            worker_id: worker_id.to_string(),
        }
        .emit();

        if orphaned.is_empty() {
            return;
        }
        for weak in live {
            if let Some(conv) = weak.upgrade() {
                let mut conv = conv.lock().await;
                for name in &orphaned {
                    conv.unregister_tool(name);
                }
            }
        }
    }

    /// `pick_worker`: session-affinity first, otherwise round-robin over
    /// the currently-alive subset.
    fn pick_worker(&self, tool_name: &str, session_id: Option<&str>) -> Option<String> {
        let mut state = self.state.lock();
        let workers = state.tool_to_workers.get(tool_name)?.clone();
        if workers.is_empty() {
            return None;
        }

        if let Some(sid) = session_id {
            if let Some(affine) = state.session_affinity.get(sid).cloned() {
                if workers.contains(&affine) && state.worker_senders.contains_key(&affine) {
                    return Some(affine);
                }
            }
        }

        let alive: Vec<String> = workers
            .into_iter()
            .filter(|w| state.worker_senders.contains_key(w))
            .collect();
        if alive.is_empty() {
            return None;
        }

        let idx = *state.tool_rr_index.get(tool_name).unwrap_or(&0) % alive.len();
        state.tool_rr_index.insert(tool_name.to_string(), idx + 1);
        let chosen = alive[idx].clone();

        if let Some(sid) = session_id {
            state.session_affinity.insert(sid.to_string(), chosen.clone());
        }
        Some(chosen)
    }

    /// Route a tool call to a worker, send it, and await its result with a
    /// hard 120s deadline. Every failure mode returns a literal `"Error:
    /// ..."` string rather than propagating — per the distilled spec, no
    /// per-tool error is hub-fatal.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        session_id: Option<&str>,
    ) -> String {
        let Some(worker_id) = self.pick_worker(tool_name, session_id) else {
            return format!("Error: no worker registered for tool '{tool_name}'");
        };

        let call_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock();
            let Some(sender) = state.worker_senders.get(&worker_id).cloned() else {
                return format!("Error: worker for tool '{tool_name}' is disconnected");
            };
            state.pending.insert(call_id.clone(), tx);
            state.call_to_worker.insert(call_id.clone(), worker_id.clone());
            state.busy_workers.insert(worker_id.clone());

            let frame = sa_protocol::WorkerMessage::ToolCall(sa_protocol::ToolCall {
                call_id: call_id.clone(),
                name: tool_name.to_string(),
                input,
            });
            let json = serde_json::to_string(&frame).unwrap_or_default();
            if sender.send(json).is_err() {
                // Race with a disconnect that hasn't been processed yet:
                // fall through to the timeout path below rather than
                // special-casing it — the result is the same error class.
            }
        }

        TraceEvent::ToolDispatched {
            call_id: call_id.clone(),
            tool_name: tool_name.to_string(),
            worker_id: worker_id.clone(),
        }
        .emit();

        match tokio::time::timeout(DISPATCH_TIMEOUT, rx).await {
            Ok(Ok(content)) => content,
            Ok(Err(_)) | Err(_) => {
                let mut state = self.state.lock();
                state.pending.remove(&call_id);
                state.call_to_worker.remove(&call_id);
                let still_busy = state.call_to_worker.values().any(|w| w == &worker_id);
                if !still_busy {
                    state.busy_workers.remove(&worker_id);
                }
                drop(state);
                TraceEvent::ToolTimedOut {
                    call_id,
                    tool_name: tool_name.to_string(),
                    worker_id,
                }
                .emit();
                format!("Error: tool '{tool_name}' timed out after 120s")
            }
        }
    }

    /// Install a handler on `conv` for every currently-known tool schema,
    /// each forwarding to `dispatch(name, input, session_id)`. Every
    /// conversation gets its own dispatcher instance so `session_id` can be
    /// closed over, per the distilled spec's dynamic-handler-injection
    /// model — this is what lets the same tool route differently depending
    /// on which session (if any) is asking.
    pub fn register_tools_on(&self, conv: &mut Conversation, session_id: Option<&str>) {
        let dispatcher: Arc<dyn sa_domain::tool::ToolDispatcher> = Arc::new(HubDispatcher {
            hub: self.clone(),
            session_id: session_id.map(String::from),
        });
        for schema in self.tool_schemas() {
            conv.register_tool(schema, dispatcher.clone());
        }
    }
}

/// Forwards a tool call back through the hub that installed it, closing
/// over the session id (if any) so routing can use session affinity.
struct HubDispatcher {
    hub: Hub,
    session_id: Option<String>,
}

#[async_trait::async_trait]
impl sa_domain::tool::ToolDispatcher for HubDispatcher {
    async fn dispatch(&self, tool_name: &str, input: serde_json::Value) -> String {
        self.hub
            .dispatch(tool_name, input, self.session_id.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "d".into(),
            parameters: serde_json::json!({}),
        }
    }

    fn connect(hub: &Hub, id: &str) -> tokio::sync::mpsc::UnboundedReceiver<String> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        hub.connect_worker(id, tx);
        rx
    }

    #[test]
    fn register_tools_reports_only_new_names() {
        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        let _rx2 = connect(&hub, "w2");

        let first = hub.register_tools("w1", vec![schema("echo")]);
        assert_eq!(first.len(), 1);

        let second = hub.register_tools("w2", vec![schema("echo")]);
        assert!(second.is_empty());
        assert_eq!(hub.tool_schemas().len(), 1);
    }

    #[test]
    fn pick_worker_round_robins_over_alive_set() {
        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        let _rx2 = connect(&hub, "w2");
        hub.register_tools("w1", vec![schema("t")]);
        hub.register_tools("w2", vec![schema("t")]);

        let picks: Vec<_> = (0..4).map(|_| hub.pick_worker("t", None).unwrap()).collect();
        assert_eq!(picks, vec!["w1", "w2", "w1", "w2"]);
    }

    #[test]
    fn session_affinity_sticks_across_new_joins() {
        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        hub.register_tools("w1", vec![schema("t")]);

        let first = hub.pick_worker("t", Some("s1")).unwrap();
        let _rx2 = connect(&hub, "w2");
        hub.register_tools("w2", vec![schema("t")]);

        for _ in 0..5 {
            assert_eq!(hub.pick_worker("t", Some("s1")).unwrap(), first);
        }
        // A fresh session is unaffected by s1's binding.
        let second_session_pick = hub.pick_worker("t", Some("s2")).unwrap();
        assert!(second_session_pick == "w1" || second_session_pick == "w2");
    }

    #[test]
    fn unknown_tool_has_no_worker() {
        let hub = Hub::new();
        assert!(hub.pick_worker("ghost", None).is_none());
    }

    #[tokio::test]
    async fn dispatch_with_no_workers_returns_error_string() {
        let hub = Hub::new();
        let out = hub.dispatch("missing", serde_json::json!({}), None).await;
        assert!(out.contains("no worker registered for tool 'missing'"));
    }

    #[tokio::test]
    async fn dispatch_round_trips_through_tool_result() {
        let hub = Hub::new();
        let mut rx = connect(&hub, "w1");
        hub.register_tools("w1", vec![schema("echo")]);

        let hub2 = hub.clone();
        let handle = tokio::spawn(async move {
            hub2.dispatch("echo", serde_json::json!({"x": 1}), None).await
        });

        let frame = rx.recv().await.expect("frame sent to worker");
        let parsed: sa_protocol::WorkerMessage = serde_json::from_str(&frame).unwrap();
        let call_id = match parsed {
            sa_protocol::WorkerMessage::ToolCall(c) => c.call_id,
            other => panic!("unexpected frame: {other:?}"),
        };

        hub.complete_call(&call_id, "ok".into());
        assert_eq!(handle.await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn disconnect_cleans_up_every_map() {
        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        hub.register_tools("w1", vec![schema("t")]);
        let _ = hub.pick_worker("t", Some("s1"));

        hub.disconnect_worker("w1").await;
        assert!(hub.tool_schemas().is_empty());
        assert!(hub.pick_worker("t", Some("s1")).is_none());
    }

    #[tokio::test]
    async fn disconnect_keeps_tool_alive_if_another_worker_remains() {
        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        let _rx2 = connect(&hub, "w2");
        hub.register_tools("w1", vec![schema("t")]);
        hub.register_tools("w2", vec![schema("t")]);

        hub.disconnect_worker("w1").await;
        assert_eq!(hub.tool_schemas().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_unregisters_tool_from_live_conversations() {
        use crate::conversation::Conversation;
        use sa_domain::tool::ToolDispatcher;

        struct NullProvider;
        #[async_trait::async_trait]
        impl sa_providers::LlmProvider for NullProvider {
            async fn create(
                &self,
                _req: sa_providers::ChatRequest,
            ) -> sa_domain::error::Result<sa_domain::tool::ProviderResponse> {
                unreachable!()
            }
        }

        struct NullDispatcher;
        #[async_trait::async_trait]
        impl ToolDispatcher for NullDispatcher {
            async fn dispatch(&self, _tool_name: &str, _input: serde_json::Value) -> String {
                String::new()
            }
        }

        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        hub.register_tools("w1", vec![schema("t")]);

        let conv = Arc::new(tokio::sync::Mutex::new(Conversation::new(
            Arc::new(NullProvider),
            "m",
            None,
            10,
        )));
        conv.lock()
            .await
            .register_tool(schema("t"), Arc::new(NullDispatcher));
        hub.track_conversation(&conv);

        hub.disconnect_worker("w1").await;
        assert!(conv.lock().await.tools().is_empty());
    }

    #[tokio::test]
    async fn register_tools_on_installs_every_known_schema() {
        struct NullProvider;
        #[async_trait::async_trait]
        impl sa_providers::LlmProvider for NullProvider {
            async fn create(
                &self,
                _req: sa_providers::ChatRequest,
            ) -> sa_domain::error::Result<sa_domain::tool::ProviderResponse> {
                unreachable!()
            }
        }

        let hub = Hub::new();
        let _rx1 = connect(&hub, "w1");
        hub.register_tools("w1", vec![schema("a"), schema("b")]);

        let mut conv = Conversation::new(Arc::new(NullProvider), "m", None, 10);
        hub.register_tools_on(&mut conv, Some("s1"));

        let mut names: Vec<_> = conv.tools().iter().map(|t| t.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
