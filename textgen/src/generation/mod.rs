//! # Streaming Generation Controller
//!
//! Turns a [`GenerationRequest`] into a lazy sequence of decoded transcripts.
//!
//! - **Bulk** mode makes one model call for the whole token budget and yields
//!   a single transcript.
//! - **Incremental** mode yields the prompt first, then repeatedly extends the
//!   running token sequence by a small increment, re-decodes the whole sequence
//!   and yields it. It stops after `max_new_tokens / increment + 1` increments,
//!   when the last token is the stop id, or when a call adds no tokens.
//!
//! Every yielded element is the full transcript (prompt included), so callers
//! can re-extract the reply from scratch each time. Cancellation is checked
//! between increments; dropping the [`ReplyStream`] stops it as well.
//!
//! ```rust
//! use textgen::extensions::ExtensionRegistry;
//! use textgen::generation::{generate_reply, GeneratorConfig};
//! use textgen::generation_backend::RecordedModel;
//! use textgen::types::GenerationRequest;
//! use tokio_util::sync::CancellationToken;
//!
//! let model = RecordedModel::from_completions("demo", [" world"]);
//! let stream = generate_reply(
//!     &model,
//!     &ExtensionRegistry::new(),
//!     &GeneratorConfig::default(),
//!     GenerationRequest::new("Hello", 16),
//!     CancellationToken::new(),
//! )?;
//! let last = stream.last().transpose()?;
//! assert_eq!(last.as_deref(), Some("Hello world"));
//! # Ok::<(), textgen::types::GenerationError>(())
//! ```

pub mod config;
pub mod formatting;

pub use config::{GeneratorConfig, DEFAULT_INCREMENT};
pub use formatting::{fix_galactica, fix_gpt4chan, format_for_model, is_galactica, is_gpt4chan};

use std::time::Instant;
use textgen_common::logging::PROMPT_TARGET;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::extensions::{ExtensionRegistry, Hook};
use crate::model::{ModelAdapter, ModelCall, CONTEXT_LIMIT, END_OF_TEXT};
use crate::stopper::{EosStopper, MaxTokensStopper, SentinelStopper, Stopper};
use crate::types::{
    DecodingConfig, FinishReason, GenerationError, GenerationRequest, ModelError, StreamingMode,
};

/// Decode a full sequence for display.
pub fn decode_reply(model: &dyn ModelAdapter, tokens: &[u32]) -> Result<String, ModelError> {
    Ok(model.decode(tokens, true)?.replace(END_OF_TEXT, ""))
}

/// Encode a prompt, keeping its last `CONTEXT_LIMIT - reserved` tokens.
pub fn encode_prompt(
    model: &dyn ModelAdapter,
    prompt: &str,
    reserved: usize,
) -> Result<Vec<u32>, ModelError> {
    let mut tokens = model.encode(prompt, true)?;
    let max_length = CONTEXT_LIMIT.saturating_sub(reserved);
    if tokens.len() > max_length {
        debug!(
            "Truncating prompt from {} to {} tokens",
            tokens.len(),
            max_length
        );
        tokens.drain(..tokens.len() - max_length);
    }
    Ok(tokens)
}

enum Phase {
    Bulk,
    Prompt,
    Increment { remaining: usize },
    Done,
}

/// Lazy sequence of transcripts produced by [`generate_reply`].
pub struct ReplyStream<'a> {
    model: &'a dyn ModelAdapter,
    extensions: ExtensionRegistry,
    config: GeneratorConfig,
    cancel: CancellationToken,
    decoding: DecodingConfig,
    max_new_tokens: usize,
    original_prompt: String,
    /// Decoded prompt tokens after input transforms and truncation; its length
    /// is cut from decoded text outside chat mode.
    effective_prompt: String,
    tokens: Vec<u32>,
    prompt_len: usize,
    stop_id: u32,
    sentinel: Option<(Vec<u32>, String)>,
    phase: Phase,
    finish_reason: Option<FinishReason>,
    started: Instant,
}

/// Start generating a reply for `request`.
///
/// Encoding, stop-token lookup and configuration checks happen eagerly; model
/// calls happen as the returned stream is consumed.
pub fn generate_reply<'a>(
    model: &'a dyn ModelAdapter,
    extensions: &ExtensionRegistry,
    config: &GeneratorConfig,
    request: GenerationRequest,
    cancel: CancellationToken,
) -> Result<ReplyStream<'a>, GenerationError> {
    config.validate().map_err(GenerationError::InvalidConfig)?;
    request
        .decoding
        .validate()
        .map_err(GenerationError::InvalidConfig)?;
    let decoding = request.decoding.clone().clamped();

    let original_prompt = request.prompt;
    let question = if config.mode.is_chat() {
        original_prompt.clone()
    } else {
        extensions.apply(Hook::Input, &original_prompt)
    };
    if config.verbose {
        info!(target: PROMPT_TARGET, "\n\n{}\n--------------------\n", question);
    }

    let tokens = encode_prompt(model, &question, request.max_new_tokens)?;
    let effective_prompt = decode_reply(model, &tokens)?;
    let stop_id = match &request.eos_token {
        None => model.eos_token_id(),
        Some(eos) => *model.encode(eos, false)?.last().ok_or_else(|| {
            GenerationError::InvalidConfig(format!("end token {:?} encodes to nothing", eos))
        })?,
    };
    let sentinel = match request.stopping_string {
        Some(text) => Some((model.encode(&text, false)?, text)),
        None => None,
    };

    let phase = match config.streaming {
        StreamingMode::Bulk => Phase::Bulk,
        StreamingMode::Incremental => Phase::Prompt,
    };

    debug!(
        model = model.name(),
        prompt_tokens = tokens.len(),
        max_new_tokens = request.max_new_tokens,
        "Starting generation"
    );

    Ok(ReplyStream {
        model,
        extensions: extensions.clone(),
        config: config.clone(),
        cancel,
        decoding,
        max_new_tokens: request.max_new_tokens,
        original_prompt,
        effective_prompt,
        prompt_len: tokens.len(),
        tokens,
        stop_id,
        sentinel,
        phase,
        finish_reason: None,
        started: Instant::now(),
    })
}

impl ReplyStream<'_> {
    /// Why the stream ended, once it has.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// The prompt as the model sees it: decoded after input transforms and
    /// left truncation. Transcripts yielded in chat mode start with it.
    pub fn prompt_text(&self) -> &str {
        &self.effective_prompt
    }

    /// Tokens generated so far.
    pub fn tokens_generated(&self) -> usize {
        self.tokens.len().saturating_sub(self.prompt_len)
    }

    fn stoppers(&self, max_new_tokens: usize) -> Vec<Box<dyn Stopper>> {
        let mut stoppers: Vec<Box<dyn Stopper>> = vec![
            Box::new(EosStopper::new(self.stop_id)),
            Box::new(MaxTokensStopper::new(max_new_tokens)),
        ];
        if let Some((ids, text)) = &self.sentinel {
            stoppers.push(Box::new(
                SentinelStopper::new(ids.clone(), self.prompt_len).with_label(text.clone()),
            ));
        }
        stoppers
    }

    fn call_model(&mut self, max_new_tokens: usize, min_length: u32) -> Result<usize, ModelError> {
        let decoding = DecodingConfig {
            min_length,
            ..self.decoding.clone()
        };
        let before = self.tokens.len();
        let output = self.model.generate(ModelCall {
            input: &self.tokens,
            max_new_tokens,
            decoding: &decoding,
            stoppers: self.stoppers(max_new_tokens),
        })?;
        self.tokens = output;
        Ok(self.tokens.len().saturating_sub(before))
    }

    /// Decode the running sequence and apply mode-specific post-processing.
    fn render(&self) -> Result<String, ModelError> {
        let decoded = decode_reply(self.model, &self.tokens)?;
        Ok(self.finish_text(decoded))
    }

    fn finish_text(&self, decoded: String) -> String {
        if self.config.mode.is_chat() {
            return decoded;
        }
        let suffix: String = decoded
            .chars()
            .skip(self.effective_prompt.chars().count())
            .collect();
        let reply = format!(
            "{}{}",
            self.original_prompt,
            self.extensions.apply(Hook::Output, &suffix)
        );
        format_for_model(reply, self.model.name())
    }

    /// The prompt shown before the first increment.
    fn finish_prompt(&self) -> String {
        if self.config.mode.is_chat() {
            self.effective_prompt.clone()
        } else {
            format_for_model(self.original_prompt.clone(), self.model.name())
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        let generated = self.tokens_generated();
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "Output generated in {:.2} seconds ({} tokens, {:?})",
            elapsed, generated, reason
        );
        self.finish_reason = Some(reason);
        self.phase = Phase::Done;
    }

    fn step(&mut self) -> Result<Option<String>, GenerationError> {
        match self.phase {
            Phase::Done => Ok(None),
            Phase::Bulk => {
                if self.cancel.is_cancelled() {
                    self.finish(FinishReason::Cancelled);
                    return Ok(None);
                }
                let max_new_tokens = self.max_new_tokens;
                self.call_model(max_new_tokens, self.decoding.min_length)?;
                let reason = if self.tokens.last() == Some(&self.stop_id) {
                    FinishReason::EndOfSequence
                } else {
                    FinishReason::MaxTokens
                };
                let text = self.render()?;
                self.finish(reason);
                Ok(Some(text))
            }
            Phase::Prompt => {
                self.phase = Phase::Increment {
                    remaining: self.max_new_tokens / self.config.increment + 1,
                };
                Ok(Some(self.finish_prompt()))
            }
            Phase::Increment { remaining } => {
                if self.cancel.is_cancelled() {
                    debug!("Generation cancelled with {} increments left", remaining);
                    self.finish(FinishReason::Cancelled);
                    return Ok(None);
                }

                let added = self.call_model(self.config.increment, 0)?;
                let text = self.render()?;
                debug!(added, total = self.tokens_generated(), "Increment complete");

                if self.tokens.last() == Some(&self.stop_id) {
                    self.finish(FinishReason::EndOfSequence);
                } else if added == 0 {
                    self.finish(FinishReason::Stopped("no new tokens".to_string()));
                } else if remaining <= 1 {
                    self.finish(FinishReason::MaxTokens);
                } else {
                    self.phase = Phase::Increment {
                        remaining: remaining - 1,
                    };
                }
                Ok(Some(text))
            }
        }
    }
}

impl Iterator for ReplyStream<'_> {
    type Item = Result<String, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(text)) => Some(Ok(text)),
            Ok(None) => None,
            Err(e) => {
                self.phase = Phase::Done;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests;
