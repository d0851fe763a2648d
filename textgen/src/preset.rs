//! Decoding presets.
//!
//! A preset is a text file of `key=value` lines, one decoding parameter per
//! line, e.g.
//!
//! ```text
//! do_sample=True,
//! temperature=0.7,
//! top_k=40,
//! ```
//!
//! Trailing commas are ignored, as are lines without exactly one `=`, the
//! `tokens` key and keys that are not decoding parameters.

use std::path::Path;
use tracing::{debug, warn};

use crate::types::{DecodingConfig, ResourceError};

/// Literal value on the right-hand side of a preset line.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Literal {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "True" | "true" => return Some(Literal::Bool(true)),
            "False" | "false" => return Some(Literal::Bool(false)),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Some(Literal::Int(i));
        }
        raw.parse::<f64>().ok().map(Literal::Float)
    }

    fn as_f32(&self) -> Option<f32> {
        match self {
            Literal::Int(i) => Some(*i as f32),
            Literal::Float(f) => Some(*f as f32),
            Literal::Bool(_) => None,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Literal::Int(i) => u32::try_from(*i).ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            Literal::Int(i) => Some(*i != 0),
            Literal::Float(_) => None,
        }
    }
}

/// Apply one `key`/`value` pair. Returns false if the pair was not used.
fn apply(config: &mut DecodingConfig, key: &str, value: &Literal) -> bool {
    fn set<T>(slot: &mut T, value: Option<T>) -> bool {
        match value {
            Some(v) => {
                *slot = v;
                true
            }
            None => false,
        }
    }

    match key {
        "do_sample" => set(&mut config.do_sample, value.as_bool()),
        "early_stopping" => set(&mut config.early_stopping, value.as_bool()),
        "temperature" => set(&mut config.temperature, value.as_f32()),
        "top_p" => set(&mut config.top_p, value.as_f32()),
        "typical_p" => set(&mut config.typical_p, value.as_f32()),
        "repetition_penalty" => set(&mut config.repetition_penalty, value.as_f32()),
        "penalty_alpha" => set(&mut config.penalty_alpha, value.as_f32()),
        "length_penalty" => set(&mut config.length_penalty, value.as_f32()),
        "top_k" => set(&mut config.top_k, value.as_u32()),
        "num_beams" => set(&mut config.num_beams, value.as_u32()),
        "min_length" => set(&mut config.min_length, value.as_u32()),
        "no_repeat_ngram_size" => set(&mut config.no_repeat_ngram_size, value.as_u32()),
        _ => false,
    }
}

/// Parse preset text on top of the default decoding configuration.
pub fn parse_preset(text: &str) -> DecodingConfig {
    let mut config = DecodingConfig::default();
    for line in text.lines() {
        let line = line.trim_end_matches(',').trim();
        let parts: Vec<&str> = line.split('=').collect();
        let [key, raw] = parts.as_slice() else {
            continue;
        };
        let (key, raw) = (key.trim(), raw.trim());
        if key == "tokens" {
            continue;
        }
        match Literal::parse(raw) {
            Some(value) if apply(&mut config, key, &value) => {}
            Some(_) => debug!("Ignoring preset key {:?}", key),
            None => warn!("Ignoring preset line with unreadable value: {:?}", line),
        }
    }
    config.clamped()
}

/// Load `presets/<name>.txt` from `dir`.
pub fn load_preset(dir: &Path, name: &str) -> Result<DecodingConfig, ResourceError> {
    let path = dir.join(format!("{}.txt", name));
    if !path.is_file() {
        return Err(ResourceError::NotFound {
            kind: "preset",
            name: name.to_string(),
        });
    }
    let text = std::fs::read_to_string(&path).map_err(|e| ResourceError::io(&path, e))?;
    debug!("Loaded preset {} from {:?}", name, path);
    Ok(parse_preset(&text))
}
