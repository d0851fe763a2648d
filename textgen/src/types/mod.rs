//! Shared data types for the textgen engine.

pub mod errors;
pub mod generation;
pub mod history;
pub mod ids;

pub use errors::{
    EngineError, ExtensionError, GenerationError, ModelError, ResourceError, SessionError,
};
pub use generation::{
    DecodingConfig, FinishReason, GenerationRequest, InteractionMode, StreamingMode,
    MAX_TEMPERATURE,
};
pub use history::{tokenize_dialogue, History, Turn, BEGIN_CHAT_SENTINEL};
pub use ids::SessionId;
