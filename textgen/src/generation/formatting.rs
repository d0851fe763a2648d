//! Model-family output fixes.

use regex::Regex;
use std::sync::OnceLock;

/// Number of cleanup passes over GPT-4chan output.
const GPT4CHAN_PASSES: usize = 10;

pub fn is_galactica(model_name: &str) -> bool {
    model_name.to_lowercase().starts_with("galactica")
}

pub fn is_gpt4chan(model_name: &str) -> bool {
    let lower = model_name.to_lowercase();
    ["gpt4chan", "gpt-4chan", "4chan"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Rewrite GALACTICA's LaTeX delimiters to `$`.
pub fn fix_galactica(text: &str) -> String {
    text.replace(r"\[", "$")
        .replace(r"\]", "$")
        .replace(r"\(", "$")
        .replace(r"\)", "$")
        .replace("$$", "$")
}

fn gpt4chan_patterns() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"--- [0-9]*\n>>[0-9]*\n---").expect("static regex"),
            Regex::new(r"--- [0-9]*\n *\n---").expect("static regex"),
            Regex::new(r"--- [0-9]*\n\n\n---").expect("static regex"),
        ]
    })
}

/// Remove empty replies from GPT-4chan threads.
pub fn fix_gpt4chan(text: &str) -> String {
    let mut text = text.to_string();
    for _ in 0..GPT4CHAN_PASSES {
        for pattern in gpt4chan_patterns() {
            text = pattern.replace_all(&text, "---").into_owned();
        }
    }
    text
}

/// Apply the fix for `model_name`'s family, if any.
pub fn format_for_model(text: String, model_name: &str) -> String {
    if is_galactica(model_name) {
        fix_galactica(&text)
    } else if is_gpt4chan(model_name) {
        fix_gpt4chan(&text)
    } else {
        text
    }
}
