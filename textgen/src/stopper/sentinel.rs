use super::Stopper;
use crate::types::FinishReason;
use tracing::debug;

/// Stops once a sentinel token sequence appears after the prompt.
///
/// Only tokens at or after `starting_idx` are searched, so a sentinel that is
/// already present in the prompt (for example an earlier `"\nYou:"` line) does
/// not end generation.
#[derive(Debug, Clone)]
pub struct SentinelStopper {
    sentinel: Vec<u32>,
    starting_idx: usize,
    label: String,
}

impl SentinelStopper {
    pub fn new(sentinel: Vec<u32>, starting_idx: usize) -> Self {
        Self {
            sentinel,
            starting_idx,
            label: String::new(),
        }
    }

    /// Attach the sentinel's text for the finish reason and logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn starting_idx(&self) -> usize {
        self.starting_idx
    }
}

impl Stopper for SentinelStopper {
    fn should_stop(&mut self, sequence: &[u32]) -> Option<FinishReason> {
        if self.sentinel.is_empty() || sequence.len() <= self.starting_idx {
            return None;
        }

        let generated = &sequence[self.starting_idx..];
        if generated
            .windows(self.sentinel.len())
            .any(|window| window == self.sentinel.as_slice())
        {
            debug!("Sentinel {:?} found after prompt", self.label);
            return Some(FinishReason::Stopped(self.label.clone()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ignores_prompt_tokens() {
        let mut stopper = SentinelStopper::new(vec![9, 8], 3);
        assert_eq!(stopper.should_stop(&[9, 8, 1]), None);
        assert_eq!(stopper.should_stop(&[9, 8, 1, 4, 9]), None);
    }

    #[test]
    fn test_sentinel_found_after_prompt() {
        let mut stopper = SentinelStopper::new(vec![9, 8], 3).with_label("\nYou:");
        assert_eq!(
            stopper.should_stop(&[9, 8, 1, 4, 9, 8]),
            Some(FinishReason::Stopped("\nYou:".to_string()))
        );
    }

    #[test]
    fn test_empty_sentinel_never_fires() {
        let mut stopper = SentinelStopper::new(vec![], 0);
        assert_eq!(stopper.should_stop(&[1, 2, 3]), None);
    }
}
