use super::Stopper;
use crate::types::FinishReason;
use tracing::{debug, info, warn};

/// Stopper that limits a generation call to a maximum number of new tokens.
///
/// The stopper is evaluated once per appended token, so it counts calls rather
/// than inspecting the sequence. Prompt tokens are never counted.
///
/// # Examples
///
/// ```rust
/// use textgen::stopper::{MaxTokensStopper, Stopper};
///
/// let mut stopper = MaxTokensStopper::new(2);
/// assert!(stopper.should_stop(&[1, 10]).is_none());
/// assert!(stopper.should_stop(&[1, 10, 11]).is_some());
/// ```
#[derive(Debug)]
pub struct MaxTokensStopper {
    /// Maximum number of tokens allowed before stopping generation.
    max_tokens: usize,

    /// Running count of tokens generated so far.
    tokens_generated: usize,
}

impl MaxTokensStopper {
    /// Create a new max tokens stopper with the specified limit.
    ///
    /// A limit of 0 stops on the first evaluation.
    pub fn new(max_tokens: usize) -> Self {
        debug!(
            "Creating MaxTokensStopper with limit: {} tokens",
            max_tokens
        );

        if max_tokens == 0 {
            warn!("MaxTokensStopper created with 0 token limit - will stop immediately");
        }

        Self {
            max_tokens,
            tokens_generated: 0,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn tokens_generated(&self) -> usize {
        self.tokens_generated
    }

    /// Number of tokens remaining, or 0 if the limit has been reached.
    pub fn tokens_remaining(&self) -> usize {
        self.max_tokens.saturating_sub(self.tokens_generated)
    }

    pub fn is_limit_reached(&self) -> bool {
        self.tokens_generated >= self.max_tokens
    }
}

impl Stopper for MaxTokensStopper {
    fn should_stop(&mut self, _sequence: &[u32]) -> Option<FinishReason> {
        self.tokens_generated = self.tokens_generated.saturating_add(1);

        if self.is_limit_reached() {
            info!(
                max_tokens = self.max_tokens,
                tokens_generated = self.tokens_generated,
                "MaxTokensStopper triggered - stopping generation"
            );
            Some(FinishReason::MaxTokens)
        } else {
            None
        }
    }
}
