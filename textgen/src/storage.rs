//! Conversation history files.
//!
//! Exports are written to `logs/{character_}YYYYmmdd-HHMMSS.json` as
//! `{"data": [...], "data_visible": [...]}`, plus `hidden_prefix` when the
//! history starts with a character's example dialogue. Imports accept that format, the
//! Pygmalion web UI's `{"chat": ["Name: line", ...]}` format, and fall back to
//! parsing the content as a pasted dialogue.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{tokenize_dialogue, History, ResourceError, Turn};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    data: Vec<Turn>,
    #[serde(default)]
    data_visible: Option<Vec<Turn>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    hidden_prefix: usize,
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

/// File name for an export made now.
pub fn export_file_name(character: Option<&str>) -> String {
    let prefix = character.map(|c| format!("{}_", c)).unwrap_or_default();
    format!("{}{}.json", prefix, Local::now().format(TIMESTAMP_FORMAT))
}

/// Write both history logs to a new file under `logs_dir`.
pub fn save_history(
    logs_dir: &Path,
    history: &History,
    character: Option<&str>,
) -> Result<PathBuf, ResourceError> {
    std::fs::create_dir_all(logs_dir).map_err(|e| ResourceError::io(logs_dir, e))?;
    let path = logs_dir.join(export_file_name(character));
    let file = HistoryFile {
        data: history.internal().to_vec(),
        data_visible: Some(history.visible().to_vec()),
        hidden_prefix: history.hidden_prefix(),
    };
    let json = serde_json::to_string(&file)
        .map_err(|e| ResourceError::Invalid(format!("could not serialize history: {}", e)))?;
    std::fs::write(&path, json).map_err(|e| ResourceError::io(&path, e))?;
    info!("Saved {} turns to {:?}", history.len(), path);
    Ok(path)
}

/// Text after the first `:` of a `"Name: text"` line, trimmed.
fn strip_speaker(line: &str) -> &str {
    line.split_once(':').map(|(_, text)| text.trim()).unwrap_or("")
}

fn from_pygmalion_chat(lines: &[String], name2: &str) -> History {
    let texts: Vec<&str> = lines.iter().map(|line| strip_speaker(line)).collect();
    let pairs = |start: usize| -> Vec<Turn> {
        texts
            .get(start..)
            .unwrap_or_default()
            .chunks_exact(2)
            .map(|pair| Turn::new(pair[0], pair[1]))
            .collect()
    };

    let opens_with_bot = lines
        .first()
        .is_some_and(|line| line.starts_with(&format!("{}:", name2)));
    if !opens_with_bot {
        return History::from_internal(pairs(0));
    }

    let mut internal = vec![Turn::greeting(texts[0])];
    internal.extend(pairs(1));
    let mut visible = internal.clone();
    visible[0].user.clear();
    History::from_parts(internal, visible).unwrap_or_default()
}

fn from_json(value: Value, name2: &str) -> Option<History> {
    let Value::Object(map) = value else {
        return None;
    };
    if map.contains_key("data") {
        let file: HistoryFile = match serde_json::from_value(Value::Object(map)) {
            Ok(file) => file,
            Err(e) => {
                warn!("History file has unreadable data: {}", e);
                return None;
            }
        };
        let history = match file.data_visible {
            Some(visible) => match History::from_parts(file.data, visible) {
                Ok(history) => history,
                Err(e) => {
                    warn!("Rejecting history file: {}", e);
                    return None;
                }
            },
            None => History::from_internal(file.data),
        };
        return Some(history.with_hidden_prefix(file.hidden_prefix));
    }
    if let Some(chat) = map.get("chat") {
        let lines: Vec<String> = serde_json::from_value(chat.clone()).ok()?;
        return Some(from_pygmalion_chat(&lines, name2));
    }
    None
}

/// Parse uploaded history content. Unrecognised content is tokenized as a
/// pasted dialogue between `name1` and `name2`.
pub fn parse_history(text: &str, name1: &str, name2: &str) -> History {
    let parsed = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| from_json(value, name2));
    match parsed {
        Some(history) => {
            debug!("Parsed history file with {} turns", history.len());
            history
        }
        None => {
            debug!("History is not a known JSON format, tokenizing as dialogue");
            History::from_internal(tokenize_dialogue(text, name1, name2))
        }
    }
}

/// Read and parse a history file.
pub fn load_history(path: &Path, name1: &str, name2: &str) -> Result<History, ResourceError> {
    let text = std::fs::read_to_string(path).map_err(|e| ResourceError::io(path, e))?;
    Ok(parse_history(&text, name1, name2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BEGIN_CHAT_SENTINEL;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut history = History::from_internal(vec![Turn::greeting("Hey")]);
        history.push(Turn::new("hi", "yo"), Turn::new("hi", "YO"));

        let path = save_history(dir.path(), &history, Some("Ada")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Ada_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "Ada_".len() + "YYYYmmdd-HHMMSS".len() + ".json".len());

        let loaded = load_history(&path, "You", "Ada").unwrap();
        assert_eq!(loaded.internal(), history.internal());
        assert_eq!(loaded.visible(), history.visible());
    }

    #[test]
    fn test_example_dialogue_stays_hidden_after_reload() {
        let dir = TempDir::new().unwrap();
        let mut history = History::with_hidden_seed(vec![Turn::new("What is 2+2?", "Four.")]);
        history.push(Turn::greeting("Good morning!"), Turn::new("", "Good morning!"));

        let path = save_history(dir.path(), &history, Some("Ada")).unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains(r#""hidden_prefix":1"#));

        let loaded = load_history(&path, "You", "Ada").unwrap();
        assert_eq!(loaded, history);
        assert_eq!(loaded.displayed(), &[Turn::new("", "Good morning!")]);
    }

    #[test]
    fn test_hidden_prefix_clamped_and_omitted_when_zero() {
        let history = parse_history(r#"{"data": [["a", "b"]], "hidden_prefix": 5}"#, "You", "Bot");
        assert_eq!(history.hidden_prefix(), 1);
        assert!(history.displayed().is_empty());

        let dir = TempDir::new().unwrap();
        let path = save_history(dir.path(), &History::from_internal(vec![Turn::new("a", "b")]), None)
            .unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("hidden_prefix"));
    }

    #[test]
    fn test_data_without_visible_copies_internal() {
        let history = parse_history(r#"{"data": [["a", "b"]]}"#, "You", "Bot");
        assert_eq!(history.visible(), history.internal());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_pygmalion_chat_with_greeting() {
        let text = r#"{"chat": ["Bot: Welcome", "You: hi", "Bot: hello: there", "You: dangling"]}"#;
        let history = parse_history(text, "You", "Bot");
        assert_eq!(
            history.internal(),
            &[
                Turn::new(BEGIN_CHAT_SENTINEL, "Welcome"),
                Turn::new("hi", "hello: there"),
            ]
        );
        assert_eq!(history.visible()[0], Turn::new("", "Welcome"));
    }

    #[test]
    fn test_pygmalion_chat_without_greeting() {
        let text = r#"{"chat": ["You: hi", "Bot: hello"]}"#;
        let history = parse_history(text, "You", "Bot");
        assert_eq!(history.visible(), &[Turn::new("hi", "hello")]);
    }

    #[test]
    fn test_fallback_tokenizes_dialogue() {
        let history = parse_history("You: hi\nBot: hello", "You", "Bot");
        assert_eq!(history.internal(), &[Turn::new("hi", "hello")]);

        let history = parse_history(r#"{"data": "not turns"}"#, "You", "Bot");
        assert!(history.is_empty());
    }

    #[test]
    fn test_mismatched_logs_fall_back() {
        let history = parse_history(r#"{"data": [["a","b"]], "data_visible": []}"#, "You", "Bot");
        assert!(history.is_empty());
    }
}
