// Public modules
pub mod callbacks;
pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod render;
pub mod session;
pub mod sse;
pub mod types;

// Re-exports
pub use callbacks::{CallbackEvent, CallbackHandler, NoopHandler, StreamingStdoutHandler};
pub use chain::ConversationChain;
pub use client::OpenAi;
pub use config::{ChatArgs, ChatConfig};
pub use error::{Error, Result};
pub use interrupt::Interrupt;
pub use llm::{ChatModel, ChatOpenAi};
pub use memory::{Memory, MotorheadMemory, MotorheadOptions};
pub use observability::register_biometrics;
pub use prompt::ChatPromptTemplate;
pub use render::Printer;
pub use session::{Line, LineSource, LoopExit, TurnLoop, TurnState};
pub use types::*;
