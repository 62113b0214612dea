use sa_domain::error::Result;
use sa_domain::tool::{Message, ProviderResponse, ToolDefinition};

/// A provider-agnostic chat completion request, mirrored on the wire as
/// `provider.create({model, max_tokens, messages, system?, tools?})`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

/// Seam between the hub's `Conversation` and whatever LLM backend is
/// configured. One call, one response: no streaming deltas — streaming
/// token output is an explicit non-goal of this hub.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn create(&self, req: ChatRequest) -> Result<ProviderResponse>;
}
