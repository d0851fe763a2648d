//! Text transform extensions.
//!
//! An extension can rewrite user input before it reaches the model, rewrite
//! model output before it is displayed, and rewrite the bot prefix that ends a
//! chat prompt. Enabled extensions run in priority order (their position in
//! the `--extensions` list).

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::types::ExtensionError;

/// Transform points exposed to extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Input,
    Output,
    BotPrefix,
}

/// A text transform plugin.
///
/// Every hook defaults to the identity transform, so an extension only
/// implements the hooks it cares about.
pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;

    fn input_modifier(&self, text: String) -> String {
        text
    }

    fn output_modifier(&self, text: String) -> String {
        text
    }

    fn bot_prefix_modifier(&self, text: String) -> String {
        text
    }

    /// Current parameter values, keyed by parameter name.
    fn params(&self) -> Map<String, Value>;

    /// Update one parameter. The value must have the parameter's type.
    fn set_param(&mut self, param: &str, value: Value) -> Result<(), ExtensionError>;
}

/// Names of the extensions compiled into this crate.
pub fn builtin_names() -> Vec<&'static str> {
    vec![CharacterBias::NAME]
}

/// Construct a built-in extension by name.
pub fn create_builtin(name: &str) -> Option<Box<dyn Extension>> {
    match name {
        CharacterBias::NAME => Some(Box::new(CharacterBias::default())),
        _ => None,
    }
}

struct ExtensionEntry {
    extension: Box<dyn Extension>,
    enabled: bool,
}

/// Snapshot of one registered extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub enabled: bool,
    pub priority: usize,
    pub params: Map<String, Value>,
}

/// Ordered, shareable set of extensions.
///
/// Cloning the registry shares the same extensions; parameter updates are seen
/// by every clone.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    entries: Arc<RwLock<Vec<ExtensionEntry>>>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load built-in extensions in the given order.
    ///
    /// Unknown names are skipped with a warning. `overrides` holds settings keys
    /// of the form `"{extension}-{param}"`; matching entries replace parameter
    /// defaults.
    pub fn from_names(names: &[String], overrides: &BTreeMap<String, Value>) -> Self {
        let registry = Self::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let Some(mut extension) = create_builtin(name) else {
                warn!("Extension {:?} is not available, skipping", name);
                continue;
            };

            let prefix = format!("{}-", name);
            for (key, value) in overrides {
                if let Some(param) = key.strip_prefix(&prefix) {
                    if let Err(e) = extension.set_param(param, value.clone()) {
                        warn!("Ignoring setting {:?}: {}", key, e);
                    }
                }
            }

            info!("Loading the extension {:?}", name);
            registry.register(extension);
        }
        registry
    }

    /// Append an enabled extension at the lowest priority.
    pub fn register(&self, extension: Box<dyn Extension>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ExtensionEntry {
                extension,
                enabled: true,
            });
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.extension.name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Run `text` through every enabled extension's hook in priority order.
    pub fn apply(&self, hook: Hook, text: &str) -> String {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|entry| entry.enabled)
            .fold(text.to_string(), |text, entry| match hook {
                Hook::Input => entry.extension.input_modifier(text),
                Hook::Output => entry.extension.output_modifier(text),
                Hook::BotPrefix => entry.extension.bot_prefix_modifier(text),
            })
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), ExtensionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .iter_mut()
            .find(|entry| entry.extension.name() == name)
            .ok_or_else(|| ExtensionError::Unknown(name.to_string()))?;
        entry.enabled = enabled;
        debug!("Extension {} enabled={}", name, enabled);
        Ok(())
    }

    /// Update several parameters of one extension.
    ///
    /// Parameters are applied in order; the first invalid one aborts the update
    /// and leaves earlier ones applied.
    pub fn update_params(
        &self,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<(), ExtensionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .iter_mut()
            .find(|entry| entry.extension.name() == name)
            .ok_or_else(|| ExtensionError::Unknown(name.to_string()))?;
        for (param, value) in params {
            entry.extension.set_param(&param, value)?;
        }
        Ok(())
    }

    pub fn describe(&self) -> Vec<ExtensionInfo> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .enumerate()
            .map(|(priority, entry)| ExtensionInfo {
                name: entry.extension.name().to_string(),
                enabled: entry.enabled,
                priority,
                params: entry.extension.params(),
            })
            .collect()
    }
}

/// Biases the bot's replies by appending a fixed phrase to the bot prefix.
#[derive(Debug, Clone)]
pub struct CharacterBias {
    activate: bool,
    bias: String,
}

impl CharacterBias {
    pub const NAME: &'static str = "character_bias";
    const ACTIVATE: &'static str = "activate";
    const BIAS: &'static str = "bias string";
}

impl Default for CharacterBias {
    fn default() -> Self {
        Self {
            activate: true,
            bias: " *I am so happy*".to_string(),
        }
    }
}

impl Extension for CharacterBias {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn bot_prefix_modifier(&self, text: String) -> String {
        if self.activate {
            format!("{} {} ", text, self.bias.trim())
        } else {
            text
        }
    }

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert(Self::ACTIVATE.to_string(), Value::Bool(self.activate));
        params.insert(Self::BIAS.to_string(), Value::String(self.bias.clone()));
        params
    }

    fn set_param(&mut self, param: &str, value: Value) -> Result<(), ExtensionError> {
        let invalid = |expected| ExtensionError::InvalidParam {
            extension: Self::NAME.to_string(),
            param: param.to_string(),
            expected,
        };
        match param {
            Self::ACTIVATE => {
                self.activate = value.as_bool().ok_or_else(|| invalid("boolean"))?;
            }
            Self::BIAS => {
                self.bias = value
                    .as_str()
                    .ok_or_else(|| invalid("string"))?
                    .to_string();
            }
            _ => {
                return Err(ExtensionError::UnknownParam {
                    extension: Self::NAME.to_string(),
                    param: param.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Shout;

    impl Extension for Shout {
        fn name(&self) -> &'static str {
            "shout"
        }

        fn input_modifier(&self, text: String) -> String {
            text.to_uppercase()
        }

        fn output_modifier(&self, text: String) -> String {
            format!("{}!", text)
        }

        fn params(&self) -> Map<String, Value> {
            Map::new()
        }

        fn set_param(&mut self, param: &str, _value: Value) -> Result<(), ExtensionError> {
            Err(ExtensionError::UnknownParam {
                extension: "shout".into(),
                param: param.into(),
            })
        }
    }

    #[test]
    fn test_empty_registry_is_identity() {
        let registry = ExtensionRegistry::new();
        assert_eq!(registry.apply(Hook::Input, "hello"), "hello");
        assert_eq!(registry.apply(Hook::BotPrefix, "Bot:"), "Bot:");
    }

    #[test]
    fn test_hooks_apply_in_order_and_respect_enabled() {
        let registry = ExtensionRegistry::new();
        registry.register(Box::new(Shout));
        registry.register(Box::new(CharacterBias::default()));

        assert_eq!(registry.apply(Hook::Input, "hi"), "HI");
        assert_eq!(registry.apply(Hook::Output, "hi"), "hi!");
        assert_eq!(
            registry.apply(Hook::BotPrefix, "Bot:"),
            "Bot: *I am so happy* "
        );

        registry.set_enabled("shout", false).unwrap();
        assert_eq!(registry.apply(Hook::Input, "hi"), "hi");
    }

    #[test]
    fn test_from_names_applies_overrides_and_skips_unknown() {
        let mut overrides = BTreeMap::new();
        overrides.insert("character_bias-bias string".to_string(), json!("*grins*"));
        overrides.insert("other-activate".to_string(), json!(false));

        let registry = ExtensionRegistry::from_names(
            &["missing".to_string(), "character_bias".to_string()],
            &overrides,
        );
        assert_eq!(registry.names(), vec!["character_bias"]);
        assert_eq!(registry.apply(Hook::BotPrefix, "Bot:"), "Bot: *grins* ");
    }

    #[test]
    fn test_update_params_validates_types() {
        let registry = ExtensionRegistry::from_names(&["character_bias".to_string()], &BTreeMap::new());

        let mut params = Map::new();
        params.insert("activate".into(), json!("yes"));
        let err = registry.update_params("character_bias", params).unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidParam { .. }));

        let mut params = Map::new();
        params.insert("activate".into(), json!(false));
        registry.update_params("character_bias", params).unwrap();
        assert_eq!(registry.apply(Hook::BotPrefix, "Bot:"), "Bot:");

        let info = registry.describe();
        assert_eq!(info[0].params["activate"], json!(false));
        assert!(matches!(
            registry.update_params("nope", Map::new()),
            Err(ExtensionError::Unknown(_))
        ));
    }
}
