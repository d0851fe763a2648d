//! Text generation request and decoding configuration types.

use serde::{Deserialize, Serialize};

/// Upper bound applied to the sampling temperature.
pub const MAX_TEMPERATURE: f32 = 1.99;

/// Sampling parameters forwarded to the model adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub typical_p: f32,
    pub repetition_penalty: f32,
    pub top_k: u32,
    pub num_beams: u32,
    pub penalty_alpha: f32,
    pub min_length: u32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: u32,
    pub early_stopping: bool,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            do_sample: true,
            temperature: 1.0,
            top_p: 1.0,
            typical_p: 1.0,
            repetition_penalty: 1.0,
            top_k: 50,
            num_beams: 1,
            penalty_alpha: 0.0,
            min_length: 0,
            length_penalty: 1.0,
            no_repeat_ngram_size: 0,
            early_stopping: false,
        }
    }
}

impl DecodingConfig {
    /// Clamp values that the model runtime cannot accept.
    pub fn clamped(mut self) -> Self {
        self.temperature = self.temperature.min(MAX_TEMPERATURE);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.temperature < 0.0 {
            return Err("temperature must not be negative".to_string());
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err("top_p must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.typical_p) {
            return Err("typical_p must be between 0.0 and 1.0".to_string());
        }
        if self.repetition_penalty <= 0.0 {
            return Err("repetition_penalty must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// How the front-end interacts with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Prompt in, continuation out in a separate pane.
    #[default]
    Default,
    /// Continuation written back into the same text buffer.
    Notebook,
    /// Turn-based conversation with history.
    Chat,
}

impl InteractionMode {
    pub fn is_chat(&self) -> bool {
        matches!(self, InteractionMode::Chat)
    }
}

/// Whether replies are produced in one call or in small increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    Bulk,
    #[default]
    Incremental,
}

/// Reason why text generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    EndOfSequence,
    MaxTokens,
    Stopped(String),
    Cancelled,
}

/// One generation request handed to the streaming controller.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_new_tokens: usize,
    pub decoding: DecodingConfig,
    /// Alternate end token; its last token id replaces the model's EOS id.
    pub eos_token: Option<String>,
    /// Text whose appearance after the prompt stops generation.
    pub stopping_string: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_new_tokens,
            decoding: DecodingConfig::default(),
            eos_token: None,
            stopping_string: None,
        }
    }

    pub fn with_decoding(mut self, decoding: DecodingConfig) -> Self {
        self.decoding = decoding;
        self
    }

    pub fn with_eos_token(mut self, eos_token: Option<String>) -> Self {
        self.eos_token = eos_token;
        self
    }

    pub fn with_stopping_string(mut self, stopping_string: Option<String>) -> Self {
        self.stopping_string = stopping_string;
        self
    }
}
