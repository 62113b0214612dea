pub mod anthropic;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use traits::{ChatRequest, LlmProvider};
