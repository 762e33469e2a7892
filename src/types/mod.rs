// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod chat_message;
pub mod memory_message;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_request::{ChatCompletionMessage, ChatCompletionRequest};
pub use chat_message::{ChatMessage, Role};
pub use memory_message::{
    AckResponse, Envelope, MemoryMessage, MemoryMessages, MemoryResponse, RetrievalRequest,
    RetrievalResult,
};
