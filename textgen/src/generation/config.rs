//! Static configuration of the streaming controller.

use serde::{Deserialize, Serialize};

use crate::types::{InteractionMode, StreamingMode};

/// Tokens requested per increment in incremental mode.
pub const DEFAULT_INCREMENT: usize = 8;

/// Process-wide generation settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub streaming: StreamingMode,
    pub mode: InteractionMode,
    /// Tokens added per increment in incremental mode.
    pub increment: usize,
    /// Log every prompt before encoding.
    pub verbose: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            streaming: StreamingMode::Incremental,
            mode: InteractionMode::Default,
            increment: DEFAULT_INCREMENT,
            verbose: false,
        }
    }
}

impl GeneratorConfig {
    pub fn new(mode: InteractionMode, no_stream: bool) -> Self {
        Self {
            streaming: if no_stream {
                StreamingMode::Bulk
            } else {
                StreamingMode::Incremental
            },
            mode,
            ..Default::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Copy of this configuration for a chat turn.
    pub fn for_chat(&self) -> Self {
        Self {
            mode: InteractionMode::Chat,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.increment == 0 {
            return Err("increment must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_stream_selects_bulk() {
        let config = GeneratorConfig::new(InteractionMode::Chat, true);
        assert_eq!(config.streaming, StreamingMode::Bulk);
        assert_eq!(config.increment, DEFAULT_INCREMENT);

        let config = GeneratorConfig::new(InteractionMode::Default, false);
        assert_eq!(config.streaming, StreamingMode::Incremental);
    }

    #[test]
    fn test_for_chat_keeps_streaming_mode() {
        let config = GeneratorConfig::new(InteractionMode::Notebook, true).for_chat();
        assert_eq!(config.mode, InteractionMode::Chat);
        assert_eq!(config.streaming, StreamingMode::Bulk);
    }

    #[test]
    fn test_zero_increment_rejected() {
        let config = GeneratorConfig {
            increment: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
