//! Conversation history: parallel internal and visible turn logs.
//!
//! The internal log holds exactly what is fed back into prompts (after input
//! transforms); the visible log holds what is displayed (after output
//! transforms). Both always have the same length and index `i` in each refers
//! to the same logical turn.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::types::errors::SessionError;

/// Marker on a turn's user side for a character's scripted opening line.
pub const BEGIN_CHAT_SENTINEL: &str = "<|BEGIN-VISIBLE-CHAT|>";

/// One (user, bot) exchange. Serialized as a two element array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Turn {
    pub user: String,
    pub bot: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
        }
    }

    /// A bot-initiated greeting turn.
    pub fn greeting(bot: impl Into<String>) -> Self {
        Self::new(BEGIN_CHAT_SENTINEL, bot)
    }

    pub fn is_greeting(&self) -> bool {
        self.user == BEGIN_CHAT_SENTINEL
    }
}

impl From<(String, String)> for Turn {
    fn from((user, bot): (String, String)) -> Self {
        Self { user, bot }
    }
}

impl From<Turn> for (String, String) {
    fn from(turn: Turn) -> Self {
        (turn.user, turn.bot)
    }
}

/// Conversation state for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    internal: Vec<Turn>,
    visible: Vec<Turn>,
    /// Leading turns that seed the prompt (example dialogue) but are not displayed.
    hidden_prefix: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history whose visible log mirrors the internal one.
    pub fn from_internal(internal: Vec<Turn>) -> Self {
        let visible = internal.clone();
        Self {
            internal,
            visible,
            hidden_prefix: 0,
        }
    }

    /// Build a history from both logs, rejecting mismatched lengths.
    pub fn from_parts(internal: Vec<Turn>, visible: Vec<Turn>) -> Result<Self, SessionError> {
        if internal.len() != visible.len() {
            return Err(SessionError::InvalidState(format!(
                "internal history has {} turns but visible history has {}",
                internal.len(),
                visible.len()
            )));
        }
        Ok(Self {
            internal,
            visible,
            hidden_prefix: 0,
        })
    }

    /// Seed turns from a character's example dialogue; they reach the prompt but are not displayed.
    pub fn with_hidden_seed(seed: Vec<Turn>) -> Self {
        let hidden_prefix = seed.len();
        let mut history = Self::from_internal(seed);
        history.hidden_prefix = hidden_prefix;
        history
    }

    /// Mark the first `count` turns as hidden seed turns, clamped to the history length.
    pub fn with_hidden_prefix(mut self, count: usize) -> Self {
        self.hidden_prefix = count.min(self.internal.len());
        self
    }

    /// Number of leading seed turns left out of [`History::displayed`].
    pub fn hidden_prefix(&self) -> usize {
        self.hidden_prefix
    }

    pub fn internal(&self) -> &[Turn] {
        &self.internal
    }

    pub fn visible(&self) -> &[Turn] {
        &self.visible
    }

    /// Visible turns without the hidden seed prefix.
    pub fn displayed(&self) -> &[Turn] {
        &self.visible[self.hidden_prefix.min(self.visible.len())..]
    }

    pub fn len(&self) -> usize {
        self.internal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty()
    }

    /// Append a turn to both logs.
    pub fn push(&mut self, internal: Turn, visible: Turn) {
        self.internal.push(internal);
        self.visible.push(visible);
    }

    /// Append the empty turn that streaming fills in.
    pub fn push_placeholder(&mut self) {
        self.push(Turn::default(), Turn::default());
    }

    /// Overwrite the most recent turn. Returns false on an empty history.
    pub fn update_last(&mut self, internal: Turn, visible: Turn) -> bool {
        match (self.internal.last_mut(), self.visible.last_mut()) {
            (Some(i), Some(v)) => {
                *i = internal;
                *v = visible;
                true
            }
            _ => false,
        }
    }

    /// Remove the most recent turn from both logs.
    pub fn pop_last(&mut self) -> Option<(Turn, Turn)> {
        let internal = self.internal.pop()?;
        let visible = self.visible.pop()?;
        self.hidden_prefix = self.hidden_prefix.min(self.internal.len());
        Some((internal, visible))
    }

    /// Remove the last exchange unless it is a character greeting.
    ///
    /// Returns the removed visible turn, or an empty turn when nothing was removed.
    pub fn remove_last(&mut self) -> Turn {
        match self.internal.last() {
            Some(last) if !last.is_greeting() => self
                .pop_last()
                .map(|(_, visible)| visible)
                .unwrap_or_default(),
            _ => Turn::default(),
        }
    }

    /// Internal text of the last bot reply, or an empty string.
    pub fn last_reply(&self) -> String {
        self.internal
            .last()
            .map(|turn| turn.bot.clone())
            .unwrap_or_default()
    }

    /// Replace the last bot reply; `internal_text` is the input-transformed form.
    pub fn replace_last_reply(&mut self, visible_text: String, internal_text: String) {
        if let (Some(v), Some(i)) = (self.visible.last_mut(), self.internal.last_mut()) {
            v.bot = visible_text;
            i.bot = internal_text;
        }
    }

    /// Clear the log.
    ///
    /// With `keep_greeting`, truncate after the first greeting turn and reset its
    /// visible form to the bare greeting. Without a greeting anchor, or without
    /// `keep_greeting`, everything is removed.
    pub fn clear(&mut self, keep_greeting: bool) {
        let anchor = if keep_greeting {
            self.internal
                .iter()
                .position(|turn| turn.user.contains(BEGIN_CHAT_SENTINEL))
        } else {
            None
        };

        match anchor {
            Some(i) => {
                self.internal.truncate(i + 1);
                self.visible.truncate(i + 1);
                self.visible[i] = Turn::new("", self.internal[i].bot.clone());
                self.hidden_prefix = self.hidden_prefix.min(i);
            }
            None => {
                self.internal.clear();
                self.visible.clear();
                self.hidden_prefix = 0;
            }
        }
    }
}

fn start_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("<START>|<start>").expect("static regex"))
}

fn anon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\n|^)[Aa]non:").expect("static regex"))
}

fn character_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\n|^)\[CHARACTER\]:").expect("static regex"))
}

/// Split a pasted transcript into turns.
///
/// Speaker boundaries are `name1:` or `name2:` at the start of a line. A turn is
/// closed by each `name2` message; pairs where both sides are empty are dropped.
pub fn tokenize_dialogue(dialogue: &str, name1: &str, name2: &str) -> Vec<Turn> {
    let dialogue = start_tag_re().replace_all(dialogue, "");
    let dialogue = anon_re().replace_all(&dialogue, "${1}You:");
    let dialogue = character_tag_re().replace_all(&dialogue, |caps: &regex::Captures<'_>| {
        format!("{}{}:", &caps[1], name2)
    });

    let speakers = match Regex::new(&format!(
        r"(^|\n)({}|{}):",
        regex::escape(name1),
        regex::escape(name2)
    )) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let starts: Vec<usize> = speakers.find_iter(&dialogue).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Vec::new();
    }

    let mut messages = Vec::with_capacity(starts.len());
    for window in starts.windows(2) {
        messages.push(dialogue[window[0]..window[1]].trim());
    }
    if let Some(&last) = starts.last() {
        messages.push(dialogue[last..].trim());
    }

    let user_label = format!("{}:", name1);
    let bot_label = format!("{}:", name2);
    let mut turns = Vec::new();
    let mut entry = Turn::default();
    for message in messages {
        if let Some(text) = message.strip_prefix(&user_label) {
            entry.user = text.trim().to_string();
        } else if let Some(text) = message.strip_prefix(&bot_label) {
            entry.bot = text.trim().to_string();
            if !(entry.user.is_empty() && entry.bot.is_empty()) {
                turns.push(std::mem::take(&mut entry));
            } else {
                entry = Turn::default();
            }
        }
    }

    debug!("Dialogue tokenized to {} turns", turns.len());
    for turn in &turns {
        debug!("| {}\n| {}", turn.user, turn.bot);
    }

    turns
}
