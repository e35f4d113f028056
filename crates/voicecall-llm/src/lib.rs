pub mod anthropic;
pub mod anthropic_stream;
pub mod embedding;
pub mod prompt;
pub mod provider;
pub mod stream;
pub mod types;

pub use embedding::cosine_similarity;
pub use provider::{EmbeddingProvider, LlmProvider, ProviderError};
pub use stream::StreamEvent;
pub use types::{ChatRequest, ChatResponse, Message, Role, ToolCall, ToolDefinition};
