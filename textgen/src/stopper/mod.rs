//! # Stop Detection
//!
//! Two layers decide when a turn is finished:
//!
//! - **Token stoppers** run inside the model adapter after every new token and
//!   end a generation call: [`EosStopper`], [`MaxTokensStopper`] and
//!   [`SentinelStopper`].
//! - **Reply extraction** ([`extract_message_from_reply`]) runs on every
//!   decoded transcript yielded by the streaming controller and decides which
//!   part of it is the new utterance, whether the other speaker has started
//!   talking, and whether a speaker label is half-way through being generated.
//!
//! ```rust
//! use textgen::stopper::{extract_message_from_reply, ReplyOptions};
//!
//! let prompt = "Chat.\nYou: hi\nBot:";
//! let transcript = "Chat.\nYou: hi\nBot: Sure, I can help.\nYou: thanks";
//! let extraction = extract_message_from_reply(
//!     prompt,
//!     transcript,
//!     &ReplyOptions::new("Bot", "You").stop_at_newline(true),
//! );
//! assert_eq!(extraction.reply, "Sure, I can help.");
//! ```

use crate::types::FinishReason;

pub mod eos;
pub mod max_tokens;
pub mod reply;
pub mod sentinel;

pub use eos::EosStopper;
pub use max_tokens::MaxTokensStopper;
pub use reply::{extract_message_from_reply, ReplyExtraction, ReplyOptions};
pub use sentinel::SentinelStopper;

/// Trait for determining when a generation call should stop.
///
/// Implementations are evaluated by the model adapter after each token is
/// appended to the running sequence. The first stopper returning a
/// [`FinishReason`] ends the call.
///
/// Stoppers are per-call state: each generation call builds fresh instances,
/// so they only need to be `Send`.
pub trait Stopper: Send {
    /// Evaluate the running token sequence (prompt included).
    ///
    /// Returns `Some(reason)` when generation should end, `None` to continue.
    /// Implementations never panic; malformed state is logged and treated as
    /// "continue".
    fn should_stop(&mut self, sequence: &[u32]) -> Option<FinishReason>;
}

/// Evaluate stoppers in order and return the first finish reason.
pub fn first_stop(stoppers: &mut [Box<dyn Stopper>], sequence: &[u32]) -> Option<FinishReason> {
    stoppers
        .iter_mut()
        .find_map(|stopper| stopper.should_stop(sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_stop_reports_earliest_stopper() {
        let mut stoppers: Vec<Box<dyn Stopper>> = vec![
            Box::new(EosStopper::new(2)),
            Box::new(MaxTokensStopper::new(1)),
        ];

        let reason = first_stop(&mut stoppers, &[5, 2]);
        assert_eq!(reason, Some(FinishReason::EndOfSequence));
    }

    #[test]
    fn test_first_stop_continues_when_nothing_fires() {
        let mut stoppers: Vec<Box<dyn Stopper>> = vec![
            Box::new(EosStopper::new(2)),
            Box::new(MaxTokensStopper::new(10)),
        ];

        assert_eq!(first_stop(&mut stoppers, &[5, 6]), None);
    }
}
