//! Interface settings.
//!
//! Settings are merged from three sources, later ones overriding earlier:
//!
//! 1. Built-in defaults
//! 2. The JSON file given with `--settings`
//! 3. `TEXTGEN_*` environment variables (e.g. `TEXTGEN_MAX_NEW_TOKENS=300`)
//!
//! Keys the struct does not name are kept in [`Settings::extra`]; keys of the
//! form `"{extension}-{param}"` there override extension parameter defaults.

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use textgen_common::ValidatedConfig;
use thiserror::Error;
use tracing::{debug, warn};

use crate::generation::is_gpt4chan;

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "TEXTGEN_";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Front-end defaults for generation and chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_new_tokens: usize,
    pub max_new_tokens_min: usize,
    pub max_new_tokens_max: usize,
    pub preset: String,
    pub name1: String,
    pub name2: String,
    pub context: String,
    pub prompt: String,
    pub prompt_gpt4chan: String,
    pub stop_at_newline: bool,
    /// Chat turns included in the prompt; 0 means no limit.
    pub history_size: usize,
    pub history_size_min: usize,
    pub history_size_max: usize,
    pub preset_pygmalion: String,
    pub name1_pygmalion: String,
    pub name2_pygmalion: String,
    pub context_pygmalion: String,
    pub stop_at_newline_pygmalion: bool,
    /// Unrecognised keys, including extension parameter overrides.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_new_tokens: 200,
            max_new_tokens_min: 1,
            max_new_tokens_max: 2000,
            preset: "NovelAI-Sphinx Moth".to_string(),
            name1: "Person 1".to_string(),
            name2: "Person 2".to_string(),
            context: "This is a conversation between two people.".to_string(),
            prompt: "Common sense questions and answers\n\nQuestion: \nFactual answer:"
                .to_string(),
            prompt_gpt4chan: "-----\n--- 865467536\nInput text\n--- 865467537\n".to_string(),
            stop_at_newline: true,
            history_size: 0,
            history_size_min: 0,
            history_size_max: 64,
            preset_pygmalion: "Pygmalion".to_string(),
            name1_pygmalion: "You".to_string(),
            name2_pygmalion: "Kawaii".to_string(),
            context_pygmalion: "Kawaii's persona: Kawaii is a cheerful person who loves to make \
                others smile. She is an optimist who loves to spread happiness and positivity \
                wherever she goes.\n<START>"
                .to_string(),
            stop_at_newline_pygmalion: false,
            extra: BTreeMap::new(),
        }
    }
}

/// The chat defaults a new conversation starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatProfile {
    pub preset: String,
    pub name1: String,
    pub name2: String,
    pub context: String,
    pub stop_at_newline: bool,
}

fn instruct_model_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(rosey|chip|joi)_.*_instruct.*").expect("static regex"))
}

impl Settings {
    /// Merge defaults, the optional settings file and the environment.
    ///
    /// A settings path that does not exist is skipped with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        match path {
            Some(path) if path.is_file() => {
                debug!("Loading settings from {:?}", path);
                figment = figment.merge(Json::file(path));
            }
            Some(path) => warn!("Settings file {:?} not found, using defaults", path),
            None => {}
        }
        figment = figment
            .merge(Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().into()));

        let settings: Settings = figment.extract().map_err(Box::new)?;
        settings.validate()?;
        debug!("Loaded settings: {}", Self::description());
        Ok(settings)
    }

    /// Settings keys that override extension parameters.
    pub fn extension_overrides(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    pub fn default_profile(&self) -> ChatProfile {
        ChatProfile {
            preset: self.preset.clone(),
            name1: self.name1.clone(),
            name2: self.name2.clone(),
            context: self.context.clone(),
            stop_at_newline: self.stop_at_newline,
        }
    }

    pub fn pygmalion_profile(&self) -> ChatProfile {
        ChatProfile {
            preset: self.preset_pygmalion.clone(),
            name1: self.name1_pygmalion.clone(),
            name2: self.name2_pygmalion.clone(),
            context: self.context_pygmalion.clone(),
            stop_at_newline: self.stop_at_newline_pygmalion,
        }
    }

    /// Pygmalion models get the Pygmalion profile; everything else the default one.
    pub fn profile_for_model(&self, model_name: &str) -> ChatProfile {
        if model_name.to_lowercase().contains("pygmalion") {
            self.pygmalion_profile()
        } else {
            self.default_profile()
        }
    }

    /// Initial prompt text for the default and notebook modes.
    pub fn default_prompt_for_model(&self, model_name: &str) -> String {
        let lower = model_name.to_lowercase();
        if is_gpt4chan(&lower) {
            self.prompt_gpt4chan.clone()
        } else if instruct_model_re().is_match(&lower) {
            "User: \n".to_string()
        } else {
            self.prompt.clone()
        }
    }

    /// Clamp a requested token budget to the configured range.
    pub fn clamp_max_new_tokens(&self, requested: usize) -> usize {
        requested.clamp(self.max_new_tokens_min, self.max_new_tokens_max)
    }

    /// Clamp a requested history size to the configured range.
    pub fn clamp_history_size(&self, requested: usize) -> usize {
        requested.clamp(self.history_size_min, self.history_size_max)
    }
}

impl ValidatedConfig for Settings {
    type Error = SettingsError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.max_new_tokens_min == 0 {
            return Err(SettingsError::Invalid(
                "max_new_tokens_min must be at least 1".to_string(),
            ));
        }
        if !(self.max_new_tokens_min..=self.max_new_tokens_max).contains(&self.max_new_tokens) {
            return Err(SettingsError::Invalid(format!(
                "max_new_tokens {} is outside {}..={}",
                self.max_new_tokens, self.max_new_tokens_min, self.max_new_tokens_max
            )));
        }
        if !(self.history_size_min..=self.history_size_max).contains(&self.history_size) {
            return Err(SettingsError::Invalid(format!(
                "history_size {} is outside {}..={}",
                self.history_size, self.history_size_min, self.history_size_max
            )));
        }
        Ok(())
    }

    fn description() -> &'static str {
        "Generation and chat defaults for the text generation front end"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;
    use textgen_common::config::DefaultConfig;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::validated_default().unwrap();
        assert_eq!(settings.max_new_tokens, 200);
        assert_eq!(settings.preset, "NovelAI-Sphinx Moth");
        assert!(settings.stop_at_newline);
    }

    #[rstest::rstest]
    #[case::zero_minimum(Settings { max_new_tokens_min: 0, ..Settings::default() }, "max_new_tokens_min")]
    #[case::tokens_above_max(Settings { max_new_tokens: 2001, ..Settings::default() }, "max_new_tokens 2001")]
    #[case::history_above_max(Settings { history_size: 65, ..Settings::default() }, "history_size 65")]
    fn test_validate_rejects(#[case] settings: Settings, #[case] mentions: &str) {
        match settings.validate() {
            Err(SettingsError::Invalid(message)) => assert!(message.contains(mentions), "{}", message),
            other => panic!("expected invalid settings, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"name1": "Me", "max_new_tokens": 64, "character_bias-activate": false}"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.name1, "Me");
        assert_eq!(settings.max_new_tokens, 64);
        assert_eq!(settings.name2, "Person 2");
        assert_eq!(
            settings.extension_overrides().get("character_bias-activate"),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(settings.max_new_tokens, 200);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_defaults() {
        std::env::set_var("TEXTGEN_HISTORY_SIZE", "12");
        let result = Settings::load(None);
        std::env::remove_var("TEXTGEN_HISTORY_SIZE");
        assert_eq!(result.unwrap().history_size, 12);
    }

    #[test]
    #[serial]
    fn test_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"history_size": 65}"#).unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_profile_for_model() {
        let settings = Settings::default();
        let profile = settings.profile_for_model("Pygmalion-6B");
        assert_eq!(profile.name2, "Kawaii");
        assert!(!profile.stop_at_newline);
        assert_eq!(settings.profile_for_model("opt-1.3b").name1, "Person 1");
    }

    #[test]
    fn test_default_prompt_for_model() {
        let settings = Settings::default();
        assert_eq!(settings.default_prompt_for_model("gpt4chan_model"), settings.prompt_gpt4chan);
        assert_eq!(settings.default_prompt_for_model("Rosey_6B_instruct"), "User: \n");
        assert_eq!(settings.default_prompt_for_model("opt-1.3b"), settings.prompt);
    }

    #[test]
    fn test_clamping() {
        let settings = Settings::default();
        assert_eq!(settings.clamp_max_new_tokens(0), 1);
        assert_eq!(settings.clamp_max_new_tokens(5000), 2000);
        assert_eq!(settings.clamp_history_size(100), 64);
    }
}
