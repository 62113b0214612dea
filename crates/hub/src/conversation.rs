//! In-memory transcript plus the provider-call driver.
//!
//! A `Conversation` owns the message history for one agent turn (or one
//! session's lifetime, if loaded from the session store) and knows how to
//! call the configured [`LlmProvider`], fold `tool_use` blocks out to
//! whatever [`ToolDispatcher`] is registered for that name, and append the
//! resulting `tool_result` blocks back in source order.
//!
//! The dispatcher seam is a trait object rather than a closure: the hub
//! installs one dispatcher (closed over its own state and, for
//! session-bound conversations, a session id) per currently-known tool
//! name. See [`sa_domain::tool::ToolDispatcher`].

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use sa_domain::error::Result;
use sa_domain::tool::{
    ContentPart, Message, MessageContent, ProviderResponse, StopReason, ToolDefinition,
    ToolDispatcher,
};
use sa_providers::{ChatRequest, LlmProvider};

/// Drives a single conversation against a remote provider, fanning
/// `tool_use` blocks out to registered dispatchers between turns.
pub struct Conversation {
    provider: Arc<dyn LlmProvider>,
    pub model: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    dispatchers: HashMap<String, Arc<dyn ToolDispatcher>>,
}

impl Conversation {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        system: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system,
            max_tokens,
            messages: Vec::new(),
            tools: Vec::new(),
            dispatchers: HashMap::new(),
        }
    }

    /// Rehydrate a conversation with a saved transcript, e.g. loaded from
    /// the session store.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Install a tool schema and the dispatcher that should serve it.
    /// Re-registering a name overwrites its previous dispatcher —
    /// last-write-wins, as the distilled spec allows — but the hub itself
    /// only ever calls this once per name, the first worker to register it.
    pub fn register_tool(&mut self, schema: ToolDefinition, dispatcher: Arc<dyn ToolDispatcher>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name == schema.name) {
            *existing = schema.clone();
        } else {
            self.tools.push(schema.clone());
        }
        self.dispatchers.insert(schema.name, dispatcher);
    }

    /// Drop a tool (and its dispatcher) — used when a worker providing the
    /// last copy of a tool disconnects.
    pub fn unregister_tool(&mut self, name: &str) {
        self.tools.retain(|t| t.name != name);
        self.dispatchers.remove(name);
    }

    fn request(&self) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: self.messages.clone(),
            system: self.system.clone(),
            tools: self.tools.clone(),
        }
    }

    /// Append a user message, call the provider, append the assistant's
    /// reply, and return the raw response.
    pub async fn send(&mut self, user_text: impl Into<String>) -> Result<ProviderResponse> {
        self.messages.push(Message::user(user_text.into()));
        self.call_and_append().await
    }

    /// Call the provider against the current transcript without appending
    /// a new user message — used to resume a turn after tool results have
    /// been appended.
    pub async fn step(&mut self) -> Result<ProviderResponse> {
        self.call_and_append().await
    }

    async fn call_and_append(&mut self) -> Result<ProviderResponse> {
        let response = self.provider.create(self.request()).await?;
        self.messages
            .push(Message::assistant_parts(response.content.clone()));
        Ok(response)
    }

    /// Run every `tool_use` block in `response` against its registered
    /// dispatcher, concurrently, then append one `{role: user,
    /// content: [tool_result, ...]}` message in the same order as the
    /// source `tool_use` blocks.
    pub async fn handle_tool_use(&mut self, response: &ProviderResponse) {
        let calls: Vec<(String, String, serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|b| match b {
                ContentPart::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        if calls.is_empty() {
            return;
        }

        let futures = calls.iter().map(|(_, name, input)| {
            let dispatcher = self.dispatchers.get(name).cloned();
            let name = name.clone();
            let input = input.clone();
            async move {
                match dispatcher {
                    Some(d) => d.dispatch(&name, input).await,
                    None => format!("Error: no handler registered for tool '{name}'"),
                }
            }
        });
        let contents = join_all(futures).await;

        let results = calls
            .into_iter()
            .zip(contents)
            .map(|((tool_use_id, _, _), content)| ContentPart::ToolResult {
                tool_use_id,
                content,
                is_error: false,
            })
            .collect();

        self.messages.push(Message::tool_results(results));
    }

    /// `send` followed by a dispatch/step loop until the provider stops
    /// requesting tools, returning the concatenation of the final
    /// response's text blocks.
    pub async fn run_until_done(&mut self, user_text: impl Into<String>) -> Result<String> {
        let mut response = self.send(user_text).await?;
        while response.stop_reason == StopReason::ToolUse {
            self.handle_tool_use(&response).await;
            response = self.step().await?;
        }
        Ok(join_text(&response))
    }
}

/// Concatenate every `text` block in a response's content, newline-joined.
pub fn join_text(response: &ProviderResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|b| match b {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the plain text a client should see for one message, used when
/// mirroring conversation state back into session summaries.
pub fn message_text(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::Parts(_) => message.content.extract_all_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        responses: std::sync::Mutex<Vec<ProviderResponse>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn create(&self, _req: ChatRequest) -> Result<ProviderResponse> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    fn provider(responses: Vec<ProviderResponse>) -> Arc<dyn LlmProvider> {
        Arc::new(ScriptedProvider {
            responses: std::sync::Mutex::new(responses),
        })
    }

    struct EchoDispatcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ToolDispatcher for EchoDispatcher {
        async fn dispatch(&self, tool_name: &str, input: serde_json::Value) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            format!("{tool_name}:{input}")
        }
    }

    fn tool_use(id: &str, name: &str) -> ContentPart {
        ContentPart::ToolUse {
            id: id.into(),
            name: name.into(),
            input: serde_json::json!({"n": id}),
        }
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant() {
        let p = provider(vec![ProviderResponse {
            content: vec![ContentPart::Text { text: "hi".into() }],
            stop_reason: StopReason::EndTurn,
        }]);
        let mut conv = Conversation::new(p, "m", None, 10);
        conv.send("hello").await.unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn run_until_done_stops_at_end_turn() {
        let p = provider(vec![ProviderResponse {
            content: vec![ContentPart::Text { text: "done".into() }],
            stop_reason: StopReason::EndTurn,
        }]);
        let mut conv = Conversation::new(p, "m", None, 10);
        let out = conv.run_until_done("go").await.unwrap();
        assert_eq!(out, "done");
    }

    #[tokio::test]
    async fn run_until_done_loops_through_tool_use() {
        let p = provider(vec![
            ProviderResponse {
                content: vec![tool_use("u1", "echo")],
                stop_reason: StopReason::ToolUse,
            },
            ProviderResponse {
                content: vec![ContentPart::Text { text: "final".into() }],
                stop_reason: StopReason::EndTurn,
            },
        ]);
        let mut conv = Conversation::new(p, "m", None, 10);
        let calls = Arc::new(AtomicUsize::new(0));
        conv.register_tool(
            ToolDefinition {
                name: "echo".into(),
                description: "d".into(),
                parameters: serde_json::json!({}),
            },
            Arc::new(EchoDispatcher { calls: calls.clone() }),
        );

        let out = conv.run_until_done("go").await.unwrap();
        assert_eq!(out, "final");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // user, assistant(tool_use), user(tool_result), assistant(final)
        assert_eq!(conv.messages.len(), 4);
        match &conv.messages[2].content {
            MessageContent::Parts(parts) => match &parts[0] {
                ContentPart::ToolResult { tool_use_id, content, .. } => {
                    assert_eq!(tool_use_id, "u1");
                    assert!(content.contains("echo"));
                }
                other => panic!("unexpected part: {other:?}"),
            },
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_handler_yields_error_string_in_order() {
        let p = provider(vec![
            ProviderResponse {
                content: vec![tool_use("u1", "known"), tool_use("u2", "unknown")],
                stop_reason: StopReason::ToolUse,
            },
            ProviderResponse {
                content: vec![ContentPart::Text { text: "final".into() }],
                stop_reason: StopReason::EndTurn,
            },
        ]);
        let mut conv = Conversation::new(p, "m", None, 10);
        conv.register_tool(
            ToolDefinition {
                name: "known".into(),
                description: "d".into(),
                parameters: serde_json::json!({}),
            },
            Arc::new(EchoDispatcher {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
        );

        conv.run_until_done("go").await.unwrap();
        match &conv.messages[2].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                match (&parts[0], &parts[1]) {
                    (
                        ContentPart::ToolResult { tool_use_id: id0, content: c0, .. },
                        ContentPart::ToolResult { tool_use_id: id1, content: c1, .. },
                    ) => {
                        assert_eq!(id0, "u1");
                        assert!(c0.contains("known"));
                        assert_eq!(id1, "u2");
                        assert!(c1.contains("no handler registered for tool 'unknown'"));
                    }
                    other => panic!("unexpected parts: {other:?}"),
                }
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
