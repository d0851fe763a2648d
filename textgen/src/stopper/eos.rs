use super::Stopper;
use crate::types::FinishReason;
use tracing::debug;

/// Stops when the most recent token is the end-of-sequence id.
///
/// The id is usually the tokenizer's EOS token, but callers may substitute
/// the last token of an alternate end string (for example `"\n"` when a chat
/// turn should end at the first newline).
#[derive(Debug, Clone)]
pub struct EosStopper {
    eos_token_id: u32,
}

impl EosStopper {
    pub fn new(eos_token_id: u32) -> Self {
        Self { eos_token_id }
    }

    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}

impl Stopper for EosStopper {
    fn should_stop(&mut self, sequence: &[u32]) -> Option<FinishReason> {
        match sequence.last() {
            Some(&token) if token == self.eos_token_id => {
                debug!("EOS token {} detected, stopping generation", token);
                Some(FinishReason::EndOfSequence)
            }
            _ => None,
        }
    }
}
