//! Error types for the textgen engine.
//!
//! Each subsystem has its own error enum; [`EngineError`] wraps them at the
//! request boundary. All of them implement [`TextgenError`] so callers can
//! route on category without matching every variant.

use std::path::PathBuf;
use textgen_common::error::{ErrorCategory, TextgenError};
use thiserror::Error;

/// Top-level errors surfaced at the request boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model error: {0}\n💡 Check the model directory and that a model is loaded")]
    Model(#[from] ModelError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),
}

/// Errors raised by a model adapter or the model manager.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("No model is loaded")]
    NotLoaded,

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("No models are available! Please download at least one.")]
    NoModelsAvailable,

    #[error("Model loading failed: {0}")]
    LoadingFailed(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Model generation failed: {0}")]
    Generation(String),
}

/// Errors that can occur while driving generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid generation configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors related to session management.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session limit exceeded")]
    LimitExceeded,

    #[error("Session {0} already has a generation in progress")]
    Busy(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Nothing to regenerate: {0}")]
    NothingToRegenerate(String),
}

/// Errors reading or writing presets, characters, and history files.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid content: {0}")]
    Invalid(String),
}

/// Errors raised while configuring extensions.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Unknown extension: {0}")]
    Unknown(String),

    #[error("Extension {extension} has no parameter {param:?}")]
    UnknownParam { extension: String, param: String },

    #[error("Parameter {param:?} of {extension} expects a {expected}")]
    InvalidParam {
        extension: String,
        param: String,
        expected: &'static str,
    },
}

impl ResourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl TextgenError for EngineError {
    fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Model(e) => e.category(),
            EngineError::Generation(e) => e.category(),
            EngineError::Session(e) => e.category(),
            EngineError::Resource(e) => e.category(),
            EngineError::Extension(e) => e.category(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            EngineError::Model(e) => e.error_code(),
            EngineError::Generation(e) => e.error_code(),
            EngineError::Session(e) => e.error_code(),
            EngineError::Resource(e) => e.error_code(),
            EngineError::Extension(e) => e.error_code(),
        }
    }
}

impl TextgenError for ModelError {
    fn category(&self) -> ErrorCategory {
        match self {
            ModelError::NotLoaded => ErrorCategory::User,
            ModelError::NotFound(_) => ErrorCategory::User,
            ModelError::NoModelsAvailable => ErrorCategory::User,
            ModelError::LoadingFailed(_) => ErrorCategory::System,
            ModelError::Tokenization(_) => ErrorCategory::External,
            ModelError::Generation(_) => ErrorCategory::External,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ModelError::NotLoaded => "MODEL_NOT_LOADED",
            ModelError::NotFound(_) => "MODEL_NOT_FOUND",
            ModelError::NoModelsAvailable => "MODEL_NONE_AVAILABLE",
            ModelError::LoadingFailed(_) => "MODEL_LOADING",
            ModelError::Tokenization(_) => "MODEL_TOKENIZATION",
            ModelError::Generation(_) => "MODEL_GENERATION",
        }
    }
}

impl TextgenError for GenerationError {
    fn category(&self) -> ErrorCategory {
        match self {
            GenerationError::InvalidConfig(_) => ErrorCategory::User,
            GenerationError::Model(e) => e.category(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            GenerationError::InvalidConfig(_) => "GENERATION_CONFIG",
            GenerationError::Model(e) => e.error_code(),
        }
    }
}

impl TextgenError for SessionError {
    fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotFound(_) => ErrorCategory::User,
            SessionError::LimitExceeded => ErrorCategory::System,
            SessionError::Busy(_) => ErrorCategory::User,
            SessionError::InvalidState(_) => ErrorCategory::Internal,
            SessionError::NothingToRegenerate(_) => ErrorCategory::User,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "SESSION_NOT_FOUND",
            SessionError::LimitExceeded => "SESSION_LIMIT",
            SessionError::Busy(_) => "SESSION_BUSY",
            SessionError::InvalidState(_) => "SESSION_STATE",
            SessionError::NothingToRegenerate(_) => "SESSION_NOTHING_TO_REGENERATE",
        }
    }
}

impl TextgenError for ResourceError {
    fn category(&self) -> ErrorCategory {
        match self {
            ResourceError::NotFound { .. } => ErrorCategory::User,
            ResourceError::Io { .. } => ErrorCategory::System,
            ResourceError::Parse { .. } => ErrorCategory::User,
            ResourceError::Invalid(_) => ErrorCategory::User,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            ResourceError::Io { .. } => "RESOURCE_IO",
            ResourceError::Parse { .. } => "RESOURCE_PARSE",
            ResourceError::Invalid(_) => "RESOURCE_INVALID",
        }
    }
}

impl TextgenError for ExtensionError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::User
    }

    fn error_code(&self) -> &'static str {
        match self {
            ExtensionError::Unknown(_) => "EXTENSION_UNKNOWN",
            ExtensionError::UnknownParam { .. } => "EXTENSION_PARAM",
            ExtensionError::InvalidParam { .. } => "EXTENSION_PARAM_TYPE",
        }
    }
}
