//! Character personas.
//!
//! A character file `characters/<name>.json` overlays the chat settings with a
//! bot name, a context header built from the persona and scenario, example
//! dialogue that seeds the prompt, and a greeting that opens the conversation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::extensions::{ExtensionRegistry, Hook};
use crate::types::{tokenize_dialogue, History, ResourceError, Turn};

/// Name that selects no character.
pub const NO_CHARACTER: &str = "None";

/// Greeting used when a character does not define one.
pub const DEFAULT_GREETING: &str = "Hello there!";

/// Prefix given to characters imported from TavernAI cards.
pub const TAVERN_PREFIX: &str = "TavernAI-";

/// Contents of a character file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterCard {
    pub char_name: String,
    pub char_persona: String,
    pub char_greeting: String,
    pub example_dialogue: String,
    pub world_scenario: String,
}

/// Character card in TavernAI's field naming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TavernCard {
    pub name: String,
    pub description: String,
    pub first_mes: String,
    pub mes_example: String,
    pub scenario: String,
}

impl TavernCard {
    /// Convert to a [`CharacterCard`], filling `{{user}}` and `{{char}}` in the
    /// example dialogue.
    pub fn into_character(self, name1: &str) -> CharacterCard {
        let example_dialogue = self
            .mes_example
            .replace("{{user}}", name1)
            .replace("{{char}}", &self.name);
        CharacterCard {
            char_name: self.name,
            char_persona: self.description,
            char_greeting: self.first_mes,
            example_dialogue,
            world_scenario: self.scenario,
        }
    }
}

/// A character applied to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCharacter {
    /// File stem the character was loaded from.
    pub name: String,
    /// Bot name for the conversation.
    pub name2: String,
    pub context: String,
    pub history: History,
}

impl CharacterCard {
    /// Context header: persona and scenario lines followed by `<START>`.
    pub fn context(&self) -> String {
        let mut context = String::new();
        if !self.char_persona.is_empty() {
            context.push_str(&format!(
                "{}'s Persona: {}\n",
                self.char_name, self.char_persona
            ));
        }
        if !self.world_scenario.is_empty() {
            context.push_str(&format!("Scenario: {}\n", self.world_scenario));
        }
        format!("{}\n<START>\n", context.trim())
    }

    /// Opening history: hidden example dialogue followed by the greeting turn.
    pub fn opening_history(&self, name1: &str, extensions: &ExtensionRegistry) -> History {
        let seed = if self.example_dialogue.is_empty() {
            Vec::new()
        } else {
            tokenize_dialogue(&self.example_dialogue, name1, &self.char_name)
        };
        let mut history = History::with_hidden_seed(seed);

        if self.char_greeting.trim().is_empty() {
            history.push(
                Turn::greeting(DEFAULT_GREETING),
                Turn::new("", DEFAULT_GREETING),
            );
        } else {
            history.push(
                Turn::greeting(self.char_greeting.clone()),
                Turn::new("", extensions.apply(Hook::Output, &self.char_greeting)),
            );
        }
        history
    }
}

fn character_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

/// Read and parse `characters/<name>.json`.
pub fn read_character(dir: &Path, name: &str) -> Result<CharacterCard, ResourceError> {
    let path = character_path(dir, name);
    if name == NO_CHARACTER || !path.is_file() {
        return Err(ResourceError::NotFound {
            kind: "character",
            name: name.to_string(),
        });
    }
    let text = std::fs::read_to_string(&path).map_err(|e| ResourceError::io(&path, e))?;
    serde_json::from_str(&text).map_err(|e| ResourceError::parse(&path, e))
}

/// Load a character and build the conversation state it opens with.
pub fn load_character(
    dir: &Path,
    name: &str,
    name1: &str,
    extensions: &ExtensionRegistry,
) -> Result<LoadedCharacter, ResourceError> {
    let card = read_character(dir, name)?;
    let history = card.opening_history(name1, extensions);
    debug!(
        "Character {} opens with {} turns ({} shown)",
        name,
        history.len(),
        history.displayed().len()
    );
    Ok(LoadedCharacter {
        name: name.to_string(),
        context: card.context(),
        name2: card.char_name,
        history,
    })
}

/// Write a character file, returning the name it was saved under.
///
/// `json` must be an object with a `char_name`. When a file with that name
/// exists, `_001`, `_002`, ... suffixes are tried. `tavern` adds the
/// [`TAVERN_PREFIX`] to the chosen name. An image, if given, is written next to
/// the file as `<name>.png`.
pub fn upload_character(
    dir: &Path,
    json: &str,
    image: Option<&[u8]>,
    tavern: bool,
) -> Result<String, ResourceError> {
    let data: Value = serde_json::from_str(json)
        .map_err(|e| ResourceError::Invalid(format!("character is not valid JSON: {}", e)))?;
    let char_name = data
        .get("char_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ResourceError::Invalid("character has no char_name".to_string()))?;
    if char_name.contains(['/', '\\']) || char_name.starts_with('.') {
        return Err(ResourceError::Invalid(format!(
            "{:?} cannot be used as a file name",
            char_name
        )));
    }

    std::fs::create_dir_all(dir).map_err(|e| ResourceError::io(dir, e))?;

    let mut outfile_name = char_name.to_string();
    let mut i = 1;
    while character_path(dir, &outfile_name).exists() {
        outfile_name = format!("{}_{:03}", char_name, i);
        i += 1;
    }
    if tavern {
        outfile_name = format!("{}{}", TAVERN_PREFIX, outfile_name);
    }

    let path = character_path(dir, &outfile_name);
    std::fs::write(&path, json).map_err(|e| ResourceError::io(&path, e))?;
    if let Some(image) = image {
        let image_path = dir.join(format!("{}.png", outfile_name));
        std::fs::write(&image_path, image).map_err(|e| ResourceError::io(&image_path, e))?;
    }

    info!("New character saved to {:?}", path);
    Ok(outfile_name)
}

/// Convert a TavernAI card and save it with the [`TAVERN_PREFIX`].
pub fn upload_tavern_character(
    dir: &Path,
    card: TavernCard,
    image: Option<&[u8]>,
    name1: &str,
) -> Result<String, ResourceError> {
    let character = card.into_character(name1);
    let json = serde_json::to_string(&character)
        .map_err(|e| ResourceError::Invalid(format!("could not serialize character: {}", e)))?;
    upload_character(dir, &json, image, true)
}
