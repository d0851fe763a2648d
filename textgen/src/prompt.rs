//! Chat prompt window builder.
//!
//! A chat prompt is the context header, as many recent turns as fit in the
//! token budget, and the pending turn:
//!
//! ```text
//! {context}
//! {name1}: {user}        <- omitted for greeting turns
//! {name2}: {bot}
//! ...
//! {name1}: {pending text}
//! {name2}:               <- bot prefix, after the bot-prefix hook
//! ```

use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;
use tracing::{debug, trace};

use crate::extensions::{ExtensionRegistry, Hook};
use crate::model::{Tokenizer, CONTEXT_LIMIT};
use crate::types::{ModelError, Turn};

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"))
}

/// Normalize paragraph breaks: every newline becomes a blank line, runs of
/// three or more newlines collapse to two, and the result is trimmed.
pub fn clean_chat_message(text: &str) -> String {
    let doubled = text.replace('\n', "\n\n");
    blank_lines_re()
        .replace_all(&doubled, "\n\n")
        .trim()
        .to_string()
}

/// Inputs to [`build_chat_prompt`] other than the pending turn.
#[derive(Debug, Clone, Copy)]
pub struct PromptWindow<'a> {
    pub context: &'a str,
    pub history: &'a [Turn],
    pub name1: &'a str,
    pub name2: &'a str,
    /// Tokens reserved for generation.
    pub max_new_tokens: usize,
    /// Maximum number of history turns to include; 0 means unlimited.
    pub history_size: usize,
}

impl PromptWindow<'_> {
    /// Token count the finished prompt must stay strictly below.
    pub fn budget(&self) -> usize {
        CONTEXT_LIMIT.saturating_sub(self.max_new_tokens)
    }
}

/// The turn being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTurn<'a> {
    /// The user said `text`; the bot answers next.
    Message(&'a str),
    /// Generate the user's next line.
    Impersonate,
}

/// Assemble the chat prompt for `pending`.
///
/// History turns are added newest first until the assembled prefix reaches the
/// budget or `history_size` turns are included. If the prompt with the pending
/// lines still meets the budget, whole turns are dropped from the oldest end
/// until it fits or no history is left.
pub fn build_chat_prompt(
    tokenizer: &dyn Tokenizer,
    extensions: &ExtensionRegistry,
    window: &PromptWindow<'_>,
    pending: PendingTurn<'_>,
) -> Result<String, ModelError> {
    let budget = window.budget();
    let header = format!("{}\n", window.context.trim());
    let mut turns: VecDeque<String> = VecDeque::new();

    let assemble = |turns: &VecDeque<String>, tail: &str| -> String {
        let mut prompt = header.clone();
        turns.iter().for_each(|turn| prompt.push_str(turn));
        prompt.push_str(tail);
        prompt
    };

    for turn in window.history.iter().rev() {
        if tokenizer.count_tokens(&assemble(&turns, ""))? >= budget {
            break;
        }
        let mut lines = String::new();
        if !turn.is_greeting() {
            lines.push_str(&format!("{}: {}\n", window.name1, turn.user.trim()));
        }
        lines.push_str(&format!("{}: {}\n", window.name2, turn.bot.trim()));
        turns.push_front(lines);

        if window.history_size != 0 && turns.len() >= window.history_size {
            break;
        }
    }

    let tail = match pending {
        PendingTurn::Message(text) => format!(
            "{}: {}\n{}",
            window.name1,
            clean_chat_message(text),
            extensions.apply(Hook::BotPrefix, &format!("{}:", window.name2))
        ),
        PendingTurn::Impersonate => format!("{}:", window.name1),
    };

    let mut prompt = assemble(&turns, &tail);
    while !turns.is_empty() && tokenizer.count_tokens(&prompt)? >= budget {
        turns.pop_front();
        trace!("Dropped oldest turn, {} remain", turns.len());
        prompt = assemble(&turns, &tail);
    }

    debug!(
        turns = turns.len(),
        of = window.history.len(),
        budget,
        "Built chat prompt"
    );
    Ok(prompt)
}
