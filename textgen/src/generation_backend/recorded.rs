//! Recorded model backend for fixture playback

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::model::{
    LoadPlan, ModelAdapter, ModelCall, ModelLoader, Tokenizer, WeightSource, END_OF_TEXT,
};
use crate::types::ModelError;

/// File name of a recording inside `models/<name>/`.
pub const RECORDING_FILE: &str = "recording.json";

const PAD_ID: u32 = 0;
const BOS_ID: u32 = 1;
const EOS_ID: u32 = 2;
const CHAR_OFFSET: u32 = 3;

/// Tokenizer with one token per Unicode scalar value.
///
/// Ids 0-2 are pad, BOS and EOS; character `c` maps to `c as u32 + 3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl CharTokenizer {
    pub fn token_for(c: char) -> u32 {
        c as u32 + CHAR_OFFSET
    }
}

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, ModelError> {
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_special_tokens {
            tokens.push(BOS_ID);
        }
        tokens.extend(text.chars().map(Self::token_for));
        Ok(tokens)
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ModelError> {
        let mut text = String::with_capacity(tokens.len());
        for &token in tokens {
            match token {
                PAD_ID | BOS_ID | EOS_ID if skip_special_tokens => {}
                PAD_ID => text.push_str("<pad>"),
                BOS_ID => text.push_str("<s>"),
                EOS_ID => text.push_str(END_OF_TEXT),
                _ => {
                    let c = char::from_u32(token - CHAR_OFFSET).ok_or_else(|| {
                        ModelError::Tokenization(format!("token {} is not a character", token))
                    })?;
                    text.push(c);
                }
            }
        }
        Ok(text)
    }

    fn eos_token_id(&self) -> u32 {
        EOS_ID
    }
}

/// A single scripted completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedExchange {
    /// The prompt the completion was recorded for (checked, not matched)
    #[serde(default)]
    pub prompt: Option<String>,
    /// Text the model produces after the prompt
    pub completion: String,
}

impl RecordedExchange {
    pub fn new(completion: impl Into<String>) -> Self {
        Self {
            prompt: None,
            completion: completion.into(),
        }
    }
}

/// Recorded playback script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedSession {
    /// Completions in the order generations request them
    pub exchanges: Vec<RecordedExchange>,
    /// Restart from the first exchange once the script is exhausted
    #[serde(default)]
    pub cycle: bool,
}

#[derive(Debug, Default)]
struct Playback {
    next_exchange: usize,
    current: Option<Cursor>,
}

#[derive(Debug)]
struct Cursor {
    tokens: Vec<u32>,
    emitted: usize,
    last_output: Vec<u32>,
}

/// Model that plays back a recorded session.
///
/// A call whose input equals the previous call's output continues the current
/// completion; any other input starts the next exchange. Each completion ends
/// with EOS, after which further calls on it produce no new tokens.
pub struct RecordedModel {
    name: String,
    tokenizer: CharTokenizer,
    session: RecordedSession,
    playback: Mutex<Playback>,
}

impl RecordedModel {
    pub fn new(name: impl Into<String>, session: RecordedSession) -> Self {
        Self {
            name: name.into(),
            tokenizer: CharTokenizer,
            session,
            playback: Mutex::new(Playback::default()),
        }
    }

    /// Script a model from plain completion strings.
    pub fn from_completions<I, S>(name: impl Into<String>, completions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exchanges = completions.into_iter().map(RecordedExchange::new).collect();
        Self::new(
            name,
            RecordedSession {
                exchanges,
                cycle: false,
            },
        )
    }

    /// Load a recorded session from a JSON file
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModelError::LoadingFailed(format!("Failed to read recording at {:?}: {}", path, e))
        })?;
        let session: RecordedSession = serde_json::from_str(&content).map_err(|e| {
            ModelError::LoadingFailed(format!(
                "Failed to parse recording JSON at {:?}: {}",
                path, e
            ))
        })?;
        Ok(Self::new(name, session))
    }

    /// Number of exchanges started so far (across cycles).
    pub fn exchanges_started(&self) -> usize {
        self.playback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_exchange
    }

    fn start_exchange(&self, playback: &mut Playback, input: &[u32]) -> Result<Cursor, ModelError> {
        let total = self.session.exchanges.len();
        let mut index = playback.next_exchange;
        if index >= total {
            if !self.session.cycle || total == 0 {
                return Err(ModelError::Generation(format!(
                    "Recorded session exhausted: attempted exchange {} but only {} recorded",
                    index + 1,
                    total
                )));
            }
            index %= total;
        }
        playback.next_exchange += 1;

        let exchange = &self.session.exchanges[index];
        if let Some(expected) = &exchange.prompt {
            let actual = self.tokenizer.decode(input, true)?;
            if &actual != expected {
                warn!(
                    "RecordedModel: prompt for exchange {} differs from the recording",
                    index + 1
                );
            }
        }
        debug!("RecordedModel: starting exchange {}", index + 1);

        let mut tokens: Vec<u32> = exchange
            .completion
            .chars()
            .map(CharTokenizer::token_for)
            .collect();
        tokens.push(EOS_ID);
        Ok(Cursor {
            tokens,
            emitted: 0,
            last_output: Vec::new(),
        })
    }
}

impl Tokenizer for RecordedModel {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, ModelError> {
        self.tokenizer.encode(text, add_special_tokens)
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ModelError> {
        self.tokenizer.decode(tokens, skip_special_tokens)
    }

    fn eos_token_id(&self) -> u32 {
        self.tokenizer.eos_token_id()
    }
}

impl ModelAdapter for RecordedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, mut call: ModelCall<'_>) -> Result<Vec<u32>, ModelError> {
        let mut playback = self.playback.lock().unwrap_or_else(PoisonError::into_inner);

        let cursor = match playback.current.take() {
            Some(cursor) if cursor.last_output == call.input => cursor,
            _ => self.start_exchange(&mut playback, call.input)?,
        };
        let mut cursor = cursor;

        let mut sequence = call.input.to_vec();
        for _ in 0..call.max_new_tokens {
            let Some(&next) = cursor.tokens.get(cursor.emitted) else {
                break;
            };
            cursor.emitted += 1;
            sequence.push(next);
            if let Some(reason) = call.check_stop(&sequence) {
                debug!("RecordedModel: stopped with {:?}", reason);
                break;
            }
        }

        cursor.last_output = sequence.clone();
        playback.current = Some(cursor);
        Ok(sequence)
    }
}

/// Loads `models/<name>/recording.json` as a [`RecordedModel`].
#[derive(Debug, Clone)]
pub struct RecordedModelLoader {
    models_dir: PathBuf,
}

impl RecordedModelLoader {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

impl ModelLoader for RecordedModelLoader {
    fn load(&self, name: &str, plan: &LoadPlan) -> Result<Box<dyn ModelAdapter>, ModelError> {
        if plan.source == WeightSource::TorchDump {
            return Err(ModelError::LoadingFailed(format!(
                "{} is a torch dump, which the recorded backend cannot play back",
                name
            )));
        }

        let dir = self.models_dir.join(name);
        if !dir.is_dir() {
            return Err(ModelError::NotFound(name.to_string()));
        }
        let model = RecordedModel::from_file(name, dir.join(RECORDING_FILE))?;
        Ok(Box::new(model))
    }
}
