//! Property tests for the chat prompt window.

use proptest::prelude::*;
use textgen::extensions::ExtensionRegistry;
use textgen::generation::{generate_reply, GeneratorConfig};
use textgen::generation_backend::{CharTokenizer, RecordedModel};
use textgen::model::{Tokenizer, CONTEXT_LIMIT};
use textgen::prompt::{build_chat_prompt, PendingTurn, PromptWindow};
use textgen::types::{GenerationRequest, InteractionMode, Turn};
use tokio_util::sync::CancellationToken;

fn message() -> impl Strategy<Value = String> {
    "[a-z]{1,12}( [a-z]{1,12}){0,8}"
}

fn history() -> impl Strategy<Value = Vec<Turn>> {
    prop::collection::vec(
        (message(), message()).prop_map(|(user, bot)| Turn::new(user, bot)),
        0..60,
    )
}

fn window<'a>(history: &'a [Turn], max_new_tokens: usize, history_size: usize) -> PromptWindow<'a> {
    PromptWindow {
        context: "A friendly chat.",
        history,
        name1: "You",
        name2: "Bot",
        max_new_tokens,
        history_size,
    }
}

/// Prompt built from the newest `count` turns.
fn expected_prompt(history: &[Turn], count: usize, text: &str) -> String {
    let mut prompt = "A friendly chat.\n".to_string();
    for turn in &history[history.len() - count..] {
        prompt.push_str(&format!("You: {}\nBot: {}\n", turn.user, turn.bot));
    }
    prompt.push_str(&format!("You: {}\nBot:", text));
    prompt
}

proptest! {
    #[test]
    fn prompt_stays_under_budget(
        history in history(),
        text in message(),
        max_new_tokens in 1usize..2000,
        history_size in 0usize..10,
    ) {
        let tokenizer = CharTokenizer;
        let window = window(&history, max_new_tokens, history_size);
        let prompt = build_chat_prompt(
            &tokenizer,
            &ExtensionRegistry::new(),
            &window,
            PendingTurn::Message(&text),
        )
        .unwrap();

        let included = prompt.matches("\nBot: ").count();
        prop_assert!(included <= history.len());
        if history_size > 0 {
            prop_assert!(included <= history_size);
        }

        // The included turns are always the newest ones, in order.
        prop_assert_eq!(&prompt, &expected_prompt(&history, included, &text));

        let tokens = tokenizer.count_tokens(&prompt).unwrap();
        if included > 0 {
            prop_assert!(tokens < window.budget());
        }

        let again = build_chat_prompt(
            &tokenizer,
            &ExtensionRegistry::new(),
            &window,
            PendingTurn::Message(&text),
        )
        .unwrap();
        prop_assert_eq!(again, prompt);
    }

    #[test]
    fn impersonation_ends_with_user_label(history in history(), max_new_tokens in 1usize..2000) {
        let prompt = build_chat_prompt(
            &CharTokenizer,
            &ExtensionRegistry::new(),
            &window(&history, max_new_tokens, 0),
            PendingTurn::Impersonate,
        )
        .unwrap();
        prop_assert!(prompt.starts_with("A friendly chat.\n"));
        prop_assert!(prompt.ends_with("\nYou:"));
    }
}

#[test]
fn oversized_header_keeps_only_pending_lines_and_truncates_left() {
    let context = "x".repeat(CONTEXT_LIMIT);
    let history = vec![Turn::new("hi", "hello"), Turn::new("how are you", "fine")];
    let max_new_tokens = 200;
    let window = PromptWindow {
        context: &context,
        history: &history,
        name1: "You",
        name2: "Bot",
        max_new_tokens,
        history_size: 0,
    };

    let prompt = build_chat_prompt(
        &CharTokenizer,
        &ExtensionRegistry::new(),
        &window,
        PendingTurn::Message("hello there"),
    )
    .unwrap();
    assert_eq!(prompt, format!("{}\nYou: hello there\nBot:", context));
    assert!(CharTokenizer.count_tokens(&prompt).unwrap() >= window.budget());

    let model = RecordedModel::from_completions("demo", [" Hi!"]);
    let stream = generate_reply(
        &model,
        &ExtensionRegistry::new(),
        &GeneratorConfig::new(InteractionMode::Chat, true),
        GenerationRequest::new(prompt.clone(), max_new_tokens),
        CancellationToken::new(),
    )
    .unwrap();
    let effective = stream.prompt_text().to_string();
    assert_eq!(effective.chars().count(), CONTEXT_LIMIT - max_new_tokens);
    assert!(prompt.ends_with(&effective));
    assert!(effective.ends_with("\nYou: hello there\nBot:"));

    let transcripts: Vec<String> = stream.map(|item| item.unwrap()).collect();
    assert_eq!(transcripts, vec![format!("{} Hi!", effective)]);
}
