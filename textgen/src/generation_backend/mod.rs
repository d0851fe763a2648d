//! Model backends bundled with the crate.
//!
//! Real inference runs behind the [`ModelAdapter`](crate::model::ModelAdapter)
//! seam and is provided by the embedding application. This module ships the
//! recorded backend: a character-level tokenizer plus scripted completions
//! played back from JSON, so the whole pipeline runs without a deep-learning
//! runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use textgen::generation_backend::RecordedModel;
//!
//! let model = RecordedModel::from_file("demo", "models/demo/recording.json")?;
//! # Ok::<(), textgen::types::ModelError>(())
//! ```

pub mod recorded;

pub use recorded::{
    CharTokenizer, RecordedExchange, RecordedModel, RecordedModelLoader, RecordedSession,
    RECORDING_FILE,
};
