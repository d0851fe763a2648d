//! # Chat Turns
//!
//! A [`Conversation`] is the state of one chat: history, context header, the
//! two participant names and the selected character. A [`ChatEngine`] runs
//! turns against it with a loaded model:
//!
//! - [`ChatEngine::chat`] adds a user message and streams the bot's reply
//!   into the newest turn.
//! - [`ChatEngine::impersonate`] drafts the user's next message without
//!   touching the history.
//! - [`ChatEngine::regenerate`] drops the newest turn and answers its user
//!   message again.
//!
//! Streaming turns report progress through a callback that receives a
//! snapshot after every surfaced update. Returning `false` from the callback
//! abandons the turn; the history keeps the last snapshot.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::character::LoadedCharacter;
use crate::extensions::{ExtensionRegistry, Hook};
use crate::generation::{generate_reply, GeneratorConfig};
use crate::model::ModelAdapter;
use crate::prompt::{build_chat_prompt, PendingTurn, PromptWindow};
use crate::settings::ChatProfile;
use crate::stopper::{extract_message_from_reply, ReplyOptions};
use crate::types::{DecodingConfig, EngineError, GenerationRequest, History, SessionError, Turn};

/// Per-request chat parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatOptions {
    pub max_new_tokens: usize,
    pub decoding: DecodingConfig,
    pub stop_at_newline: bool,
    /// Turns of history included in the prompt; 0 means no limit.
    pub history_size: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 200,
            decoding: DecodingConfig::default(),
            stop_at_newline: true,
            history_size: 0,
        }
    }
}

/// State of one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    #[serde(skip)]
    pub history: History,
    pub context: String,
    pub name1: String,
    pub name2: String,
    pub character: Option<String>,
}

impl Conversation {
    pub fn new(profile: &ChatProfile) -> Self {
        Self {
            history: History::new(),
            context: profile.context.clone(),
            name1: profile.name1.clone(),
            name2: profile.name2.clone(),
            character: None,
        }
    }

    /// Replace the conversation with a character's opening state.
    pub fn apply_character(&mut self, loaded: LoadedCharacter) {
        self.character = Some(loaded.name);
        self.name2 = loaded.name2;
        self.context = loaded.context;
        self.history = loaded.history;
    }

    /// Deselect the character, restoring the profile's bot name and context.
    pub fn reset_character(&mut self, profile: &ChatProfile) {
        self.character = None;
        self.name2 = profile.name2.clone();
        self.context = profile.context.clone();
        self.history = History::new();
    }

    /// Replace the history wholesale, e.g. from an uploaded file.
    pub fn replace_history(&mut self, history: History) {
        self.history = history;
    }

    /// Remove the newest turn unless it is the character greeting.
    ///
    /// Returns the removed user message so it can be edited and resent.
    pub fn remove_last(&mut self) -> String {
        self.history.remove_last().user
    }

    /// The newest bot reply as the model saw it.
    pub fn last_reply(&self) -> String {
        self.history.last_reply()
    }

    /// Overwrite the newest bot reply. The prompt-facing copy gets the input
    /// transforms.
    pub fn replace_last_reply(&mut self, text: &str, extensions: &ExtensionRegistry) {
        self.history
            .replace_last_reply(text.to_string(), extensions.apply(Hook::Input, text));
    }

    /// Clear the history, keeping the character greeting if there is one.
    pub fn clear(&mut self) {
        self.history.clear(self.character.is_some());
    }

    fn window<'a>(&'a self, options: &ChatOptions) -> PromptWindow<'a> {
        PromptWindow {
            context: &self.context,
            history: self.history.internal(),
            name1: &self.name1,
            name2: &self.name2,
            max_new_tokens: options.max_new_tokens,
            history_size: options.history_size,
        }
    }
}

/// Runs chat turns against a loaded model.
pub struct ChatEngine<'a> {
    model: &'a dyn ModelAdapter,
    extensions: &'a ExtensionRegistry,
    config: GeneratorConfig,
}

impl<'a> ChatEngine<'a> {
    pub fn new(
        model: &'a dyn ModelAdapter,
        extensions: &'a ExtensionRegistry,
        config: &GeneratorConfig,
    ) -> Self {
        Self {
            model,
            extensions,
            config: config.for_chat(),
        }
    }

    fn request(&self, prompt: String, options: &ChatOptions, stop: String) -> GenerationRequest {
        GenerationRequest::new(prompt, options.max_new_tokens)
            .with_decoding(options.decoding.clone())
            .with_eos_token(options.stop_at_newline.then(|| "\n".to_string()))
            .with_stopping_string(Some(stop))
    }

    /// Send `text` and stream the bot's reply into a new turn.
    pub fn chat(
        &self,
        conversation: &mut Conversation,
        text: &str,
        options: &ChatOptions,
        cancel: CancellationToken,
        on_update: &mut dyn FnMut(&[Turn]) -> bool,
    ) -> Result<(), EngineError> {
        let internal_text = self.extensions.apply(Hook::Input, text);
        let prompt = build_chat_prompt(
            self.model,
            self.extensions,
            &conversation.window(options),
            PendingTurn::Message(&internal_text),
        )?;
        let request = self.request(prompt, options, format!("\n{}:", conversation.name1));
        let reply_options = ReplyOptions::new(&conversation.name2, &conversation.name1)
            .stop_at_newline(options.stop_at_newline)
            .with_label(
                self.extensions
                    .apply(Hook::BotPrefix, &format!("{}:", conversation.name2)),
            );

        let stream = generate_reply(self.model, self.extensions, &self.config, request, cancel)?;
        let prompt = stream.prompt_text().to_string();
        conversation.history.push_placeholder();

        for transcript in stream {
            let transcript = transcript?;
            let extraction = extract_message_from_reply(&prompt, &transcript, &reply_options);
            let visible_reply = self.extensions.apply(Hook::Output, &extraction.reply);
            conversation.history.update_last(
                Turn::new(internal_text.clone(), extraction.reply),
                Turn::new(text, visible_reply),
            );

            if !extraction.substring_found && !on_update(conversation.history.displayed()) {
                debug!("Chat turn abandoned by the listener");
                return Ok(());
            }
            if extraction.next_character_found {
                break;
            }
        }

        on_update(conversation.history.displayed());
        Ok(())
    }

    /// Draft the user's next message. Returns the output-transformed draft.
    pub fn impersonate(
        &self,
        conversation: &Conversation,
        options: &ChatOptions,
        cancel: CancellationToken,
        on_update: &mut dyn FnMut(&str) -> bool,
    ) -> Result<String, EngineError> {
        let prompt = build_chat_prompt(
            self.model,
            self.extensions,
            &conversation.window(options),
            PendingTurn::Impersonate,
        )?;
        let request = self.request(prompt, options, format!("\n{}:", conversation.name2));
        let reply_options = ReplyOptions::new(&conversation.name1, &conversation.name2)
            .stop_at_newline(options.stop_at_newline);

        let stream = generate_reply(self.model, self.extensions, &self.config, request, cancel)?;
        let prompt = stream.prompt_text().to_string();

        let mut reply = String::new();
        for transcript in stream {
            let transcript = transcript?;
            let extraction = extract_message_from_reply(&prompt, &transcript, &reply_options);
            reply = extraction.reply;
            if !extraction.substring_found
                && !on_update(&self.extensions.apply(Hook::Output, &reply))
            {
                break;
            }
            if extraction.next_character_found {
                break;
            }
        }

        let draft = self.extensions.apply(Hook::Output, &reply);
        on_update(&draft);
        Ok(draft)
    }

    /// Drop the newest turn and answer its user message again.
    pub fn regenerate(
        &self,
        conversation: &mut Conversation,
        options: &ChatOptions,
        cancel: CancellationToken,
        on_update: &mut dyn FnMut(&[Turn]) -> bool,
    ) -> Result<(), EngineError> {
        match conversation.history.internal().last() {
            None => {
                return Err(SessionError::NothingToRegenerate("the history is empty".into()).into())
            }
            Some(turn) if turn.is_greeting() => {
                return Err(SessionError::NothingToRegenerate(
                    "the newest turn is the character greeting".into(),
                )
                .into())
            }
            Some(_) => {}
        }

        let Some((_, visible)) = conversation.history.pop_last() else {
            return Err(SessionError::NothingToRegenerate("the history is empty".into()).into());
        };
        debug!("Regenerating reply to {:?}", visible.user);
        self.chat(conversation, &visible.user, options, cancel, on_update)
    }
}
