//! Locating the newly generated utterance inside a decoded transcript.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::prompt::clean_chat_message;

/// Speaker configuration for one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOptions {
    /// Speaker whose utterance is being extracted.
    pub current: String,
    /// Speaker whose label marks the end of the utterance.
    pub other: String,
    /// End the utterance at the first newline.
    pub stop_at_newline: bool,
    /// Label text that precedes the utterance when it differs from
    /// `"{current}:"`, e.g. after a bot-prefix transform.
    pub label: Option<String>,
}

impl ReplyOptions {
    pub fn new(current: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            other: other.into(),
            stop_at_newline: false,
            label: None,
        }
    }

    pub fn stop_at_newline(mut self, stop_at_newline: bool) -> Self {
        self.stop_at_newline = stop_at_newline;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn effective_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}:", self.current))
    }
}

/// Result of extracting a reply from a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyExtraction {
    pub reply: String,
    /// The other speaker's label was generated; the utterance is complete.
    pub next_character_found: bool,
    /// The transcript ends with a partial `"\n{other}:"` label.
    pub substring_found: bool,
}

/// Extract the utterance of `options.current` that follows the prompt.
///
/// The prompt contains `N` occurrences of `"{current}:"` at line starts; the
/// `N`-th occurrence in the transcript is the one the model is completing.
/// When the prompt has no such label, or the transcript has fewer than `N`,
/// an empty reply is returned and a warning is logged.
pub fn extract_message_from_reply(
    prompt: &str,
    transcript: &str,
    options: &ReplyOptions,
) -> ReplyExtraction {
    let pattern = match Regex::new(&format!(r"(^|\n){}:", regex::escape(&options.current))) {
        Ok(re) => re,
        Err(e) => {
            warn!("Could not build speaker pattern for {:?}: {}", options.current, e);
            return ReplyExtraction::default();
        }
    };

    let in_prompt = pattern.find_iter(prompt).count();
    let markers: Vec<usize> = pattern.find_iter(transcript).map(|m| m.start()).collect();
    if in_prompt == 0 || markers.len() < in_prompt {
        warn!(
            speaker = %options.current,
            in_prompt,
            in_transcript = markers.len(),
            "Speaker label not found in transcript, returning empty reply"
        );
        return ReplyExtraction::default();
    }

    let marker = markers[in_prompt - 1];
    let newline = usize::from(transcript[marker..].starts_with('\n'));
    let start = marker + newline + options.effective_label().len();
    let candidate = transcript.get(start..).unwrap_or_default();

    if options.stop_at_newline {
        let reply = candidate.split('\n').next().unwrap_or_default().trim();
        return ReplyExtraction {
            reply: reply.to_string(),
            ..Default::default()
        };
    }

    let other_label = format!("\n{}:", options.other);
    let (candidate, next_character_found) = match candidate.find(&other_label) {
        Some(idx) => (&candidate[..idx], true),
        None => (candidate, false),
    };

    let substring_found = other_label
        .char_indices()
        .skip(1)
        .any(|(end, _)| candidate.ends_with(&other_label[..end]));

    ReplyExtraction {
        reply: clean_chat_message(candidate),
        next_character_found,
        substring_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PROMPT: &str = "Chat.\nYou: hi\nBot:";

    #[test]
    fn test_stop_at_newline_keeps_first_line() {
        let transcript = format!("{PROMPT} Sure, I can help.\nYou: thanks");
        let extraction = extract_message_from_reply(
            PROMPT,
            &transcript,
            &ReplyOptions::new("Bot", "You").stop_at_newline(true),
        );
        assert_eq!(extraction.reply, "Sure, I can help.");
        assert!(!extraction.next_character_found);
        assert!(!extraction.substring_found);
    }

    #[test]
    fn test_stop_at_newline_is_idempotent() {
        let options = ReplyOptions::new("Bot", "You").stop_at_newline(true);
        let first = extract_message_from_reply(
            PROMPT,
            &format!("{PROMPT} Sure, I can help.\nYou: thanks"),
            &options,
        );
        let second = extract_message_from_reply(
            PROMPT,
            &format!("{PROMPT} {}", first.reply),
            &options,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_cuts_at_other_speaker() {
        let transcript = format!("{PROMPT} One.\nTwo.\nYou: next");
        let extraction =
            extract_message_from_reply(PROMPT, &transcript, &ReplyOptions::new("Bot", "You"));
        assert_eq!(extraction.reply, "One.\n\nTwo.");
        assert!(extraction.next_character_found);
    }

    #[rstest]
    #[case("That's great!\nYo", true)]
    #[case("That's great!\n", true)]
    #[case("That's great!\nYou", true)]
    #[case("That's great!", false)]
    #[case("Young people say hi", false)]
    fn test_substring_detection(#[case] generated: &str, #[case] expected: bool) {
        let transcript = format!("{PROMPT} {generated}");
        let extraction =
            extract_message_from_reply(PROMPT, &transcript, &ReplyOptions::new("Bot", "You"));
        assert_eq!(extraction.substring_found, expected);
        assert!(!extraction.next_character_found);
    }

    #[test]
    fn test_missing_marker_returns_empty() {
        let extraction = extract_message_from_reply(
            "no labels here",
            "no labels here and more",
            &ReplyOptions::new("Bot", "You"),
        );
        assert_eq!(extraction, ReplyExtraction::default());

        let extraction = extract_message_from_reply(
            PROMPT,
            "a truncated transcript",
            &ReplyOptions::new("Bot", "You"),
        );
        assert_eq!(extraction, ReplyExtraction::default());
    }

    #[test]
    fn test_uses_transformed_label() {
        let prompt = "Chat.\nYou: hi\nBot: *smiles* ";
        let transcript = format!("{prompt}Hello!");
        let extraction = extract_message_from_reply(
            prompt,
            &transcript,
            &ReplyOptions::new("Bot", "You")
                .stop_at_newline(true)
                .with_label("Bot: *smiles* "),
        );
        assert_eq!(extraction.reply, "Hello!");
    }

    #[test]
    fn test_picks_occurrence_after_history() {
        let prompt = "Chat.\nYou: a\nBot: b\nYou: c\nBot:";
        let transcript = format!("{prompt} d");
        let extraction =
            extract_message_from_reply(prompt, &transcript, &ReplyOptions::new("Bot", "You"));
        assert_eq!(extraction.reply, "d");
    }
}
