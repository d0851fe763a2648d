//! # Textgen
//!
//! Text generation front end for local causal language models.
//!
//! The crate builds prompts, drives a model in small increments, and decides
//! when a reply is finished. It provides three interaction modes (default,
//! notebook and chat) and serves them over HTTP with server-sent events.
//!
//! ## Layers
//!
//! - [`model`]: the model seam ([`model::ModelAdapter`]), load planning and
//!   the single shared model slot
//! - [`stopper`]: token stoppers and reply extraction
//! - [`generation`]: the streaming controller ([`generation::generate_reply`])
//! - [`prompt`]: the chat prompt window under the context budget
//! - [`chat`]: conversations and the chat turn operations
//! - [`session`]: concurrent conversations with one generation each
//! - [`server`]: the HTTP API
//!
//! ## Quick Start
//!
//! ```rust
//! use textgen::chat::{ChatEngine, ChatOptions, Conversation};
//! use textgen::extensions::ExtensionRegistry;
//! use textgen::generation::GeneratorConfig;
//! use textgen::generation_backend::RecordedModel;
//! use textgen::settings::Settings;
//! use tokio_util::sync::CancellationToken;
//!
//! let model = RecordedModel::from_completions("demo", [" Hi there!\nPerson 1: more"]);
//! let extensions = ExtensionRegistry::new();
//! let engine = ChatEngine::new(&model, &extensions, &GeneratorConfig::default());
//!
//! let mut conversation = Conversation::new(&Settings::default().default_profile());
//! engine.chat(
//!     &mut conversation,
//!     "Hello",
//!     &ChatOptions::default(),
//!     CancellationToken::new(),
//!     &mut |_| true,
//! )?;
//! assert_eq!(conversation.last_reply(), "Hi there!");
//! # Ok::<(), textgen::types::EngineError>(())
//! ```

pub mod character;
pub mod chat;
pub mod extensions;
pub mod generation;
pub mod generation_backend;
pub mod model;
pub mod preset;
pub mod prompt;
pub mod resources;
pub mod server;
pub mod session;
pub mod settings;
pub mod stopper;
pub mod storage;
pub mod types;

pub use chat::{ChatEngine, ChatOptions, Conversation};
pub use extensions::ExtensionRegistry;
pub use generation::{generate_reply, GeneratorConfig, ReplyStream};
pub use model::{ModelAdapter, ModelLoader, ModelManager};
pub use server::AppState;
pub use session::SessionManager;
pub use settings::Settings;
pub use types::{EngineError, GenerationRequest, History, SessionId, Turn};
