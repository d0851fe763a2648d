//! Tests for the streaming controller against the recorded backend.

use super::*;
use crate::extensions::Extension;
use crate::generation_backend::RecordedModel;
use crate::types::{ExtensionError, InteractionMode};
use serde_json::{Map, Value};

struct Upper;

impl Extension for Upper {
    fn name(&self) -> &'static str {
        "upper"
    }

    fn input_modifier(&self, text: String) -> String {
        format!("{}!", text)
    }

    fn output_modifier(&self, text: String) -> String {
        text.to_uppercase()
    }

    fn params(&self) -> Map<String, Value> {
        Map::new()
    }

    fn set_param(&mut self, _param: &str, _value: Value) -> Result<(), ExtensionError> {
        Ok(())
    }
}

fn collect(stream: ReplyStream<'_>) -> Vec<String> {
    stream.map(|item| item.unwrap()).collect()
}

#[test]
fn test_bulk_mode_yields_once() {
    let model = RecordedModel::from_completions("demo", [" there"]);
    let config = GeneratorConfig::new(InteractionMode::Default, true);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &config,
        GenerationRequest::new("Hi", 50),
        CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(collect(stream), vec!["Hi there".to_string()]);
}

#[test]
fn test_incremental_yields_prompt_then_growing_transcripts() {
    let model = RecordedModel::from_completions("demo", [" 0123456789"]);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::default(),
        GenerationRequest::new("N:", 200),
        CancellationToken::new(),
    )
    .unwrap();

    let items = collect(stream);
    assert_eq!(
        items,
        vec![
            "N:".to_string(),
            "N: 0123456".to_string(),
            "N: 0123456789".to_string(),
        ]
    );
}

#[test]
fn test_incremental_respects_increment_count() {
    let model = RecordedModel::from_completions("demo", ["x".repeat(100)]);
    let mut stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::default(),
        GenerationRequest::new("", 16),
        CancellationToken::new(),
    )
    .unwrap();

    let mut count = 0;
    for item in stream.by_ref() {
        item.unwrap();
        count += 1;
    }
    // prompt + 16 / 8 + 1 increments
    assert_eq!(count, 4);
    assert_eq!(stream.tokens_generated(), 24);
    assert_eq!(stream.finish_reason(), Some(&FinishReason::MaxTokens));
}

#[test]
fn test_alternate_end_token_stops_at_newline() {
    let model = RecordedModel::from_completions("demo", [" one\ntwo"]);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::default().for_chat(),
        GenerationRequest::new("Q:", 200).with_eos_token(Some("\n".to_string())),
        CancellationToken::new(),
    )
    .unwrap();

    let items = collect(stream);
    assert_eq!(items.last().map(String::as_str), Some("Q: one\n"));
}

#[test]
fn test_stopping_string_ends_call() {
    let model = RecordedModel::from_completions("demo", [" Sure.\nYou: more text here"]);
    let mut stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Chat, true),
        GenerationRequest::new("You: hi\nBot:", 200)
            .with_stopping_string(Some("\nYou:".to_string())),
        CancellationToken::new(),
    )
    .unwrap();

    let text = stream.next().unwrap().unwrap();
    assert_eq!(text, "You: hi\nBot: Sure.\nYou:");
    assert!(stream.next().is_none());
}

#[test]
fn test_cancellation_stops_before_next_increment() {
    let model = RecordedModel::from_completions("demo", ["y".repeat(100)]);
    let cancel = CancellationToken::new();
    let mut stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::default(),
        GenerationRequest::new("", 200),
        cancel.clone(),
    )
    .unwrap();

    stream.next().unwrap().unwrap();
    stream.next().unwrap().unwrap();
    cancel.cancel();
    assert!(stream.next().is_none());
    assert_eq!(stream.finish_reason(), Some(&FinishReason::Cancelled));
    assert_eq!(stream.tokens_generated(), 8);
}

#[test]
fn test_transforms_apply_outside_chat_mode() {
    let extensions = ExtensionRegistry::new();
    extensions.register(Box::new(Upper));
    let model = RecordedModel::from_completions("demo", [" ok"]);

    let stream = generate_reply(
        &model,
        &extensions,
        &GeneratorConfig::new(InteractionMode::Notebook, true),
        GenerationRequest::new("say", 20),
        CancellationToken::new(),
    )
    .unwrap();

    // The model sees "say!" and produces " ok"; the reply keeps the original prompt.
    assert_eq!(collect(stream), vec!["say OK".to_string()]);
}

#[test]
fn test_chat_mode_skips_transforms() {
    let extensions = ExtensionRegistry::new();
    extensions.register(Box::new(Upper));
    let model = RecordedModel::from_completions("demo", [" ok"]);

    let stream = generate_reply(
        &model,
        &extensions,
        &GeneratorConfig::new(InteractionMode::Chat, true),
        GenerationRequest::new("say", 20),
        CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(collect(stream), vec!["say ok".to_string()]);
}

#[test]
fn test_galactica_fix_applied() {
    let model = RecordedModel::from_completions("galactica-125m", [r" \(x\)"]);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Default, true),
        GenerationRequest::new("Eq:", 20),
        CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(collect(stream), vec!["Eq: $x$".to_string()]);
}

#[test]
fn test_prompt_left_truncated() {
    let model = RecordedModel::from_completions("demo", ["!"]);
    let prompt = "a".repeat(CONTEXT_LIMIT);
    let max_new_tokens = 48;
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Chat, true),
        GenerationRequest::new(prompt, max_new_tokens),
        CancellationToken::new(),
    )
    .unwrap();

    let items = collect(stream);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].chars().count(), CONTEXT_LIMIT - max_new_tokens + 1);
    assert!(items[0].ends_with("a!"));
}

#[test]
fn test_default_mode_truncated_prompt_keeps_reply() {
    let model = RecordedModel::from_completions("demo", ["Hello world"]);
    let prompt = "a".repeat(CONTEXT_LIMIT);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Default, true),
        GenerationRequest::new(prompt.clone(), 48),
        CancellationToken::new(),
    )
    .unwrap();

    let items = collect(stream);
    assert_eq!(items, vec![format!("{}Hello world", prompt)]);
}

#[test]
fn test_default_mode_truncated_prompt_streams_growing_prefixes() {
    let model = RecordedModel::from_completions("demo", ["Hello world"]);
    let prompt = "a".repeat(CONTEXT_LIMIT);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Default, false),
        GenerationRequest::new(prompt.clone(), 48),
        CancellationToken::new(),
    )
    .unwrap();

    let items = collect(stream);
    assert_eq!(items.first(), Some(&prompt));
    assert_eq!(items.last(), Some(&format!("{}Hello world", prompt)));
    for pair in items.windows(2) {
        assert!(pair[1].starts_with(&pair[0]));
    }
}

#[test]
fn test_invalid_decoding_rejected() {
    let model = RecordedModel::from_completions("demo", ["x"]);
    let mut request = GenerationRequest::new("p", 10);
    request.decoding.top_p = 2.0;
    let result = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::default(),
        request,
        CancellationToken::new(),
    );
    assert!(matches!(result, Err(GenerationError::InvalidConfig(_))));
}

#[test]
fn test_model_error_surfaces_once() {
    let model = RecordedModel::from_completions("demo", Vec::<String>::new());
    let mut stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Default, true),
        GenerationRequest::new("p", 10),
        CancellationToken::new(),
    )
    .unwrap();

    assert!(matches!(
        stream.next(),
        Some(Err(GenerationError::Model(_)))
    ));
    assert!(stream.next().is_none());
}
