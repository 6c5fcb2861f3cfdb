//! Steps that talk to the context's assistant. The chat outcome becomes `last`.

use crate::{
    chain::{
        context::ChainContext,
        step::{step, Prompt, Step},
    },
    core::assistant::{ChatOptions, ChoiceKind, ChoiceOptions},
    error::Result,
    types::outcome::{ChatOutcome, Outcome},
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Chat,
    Solo,
    Discuss,
    Decide,
}

pub fn chat_step(mode: ChatMode, prompt: impl Into<Prompt>, options: ChatOptions) -> Step {
    let prompt = prompt.into();
    step(move |ctx: ChainContext| {
        let text = prompt.render(&ctx);
        let options = options.clone();
        async move {
            let assistant = ctx.assistant()?;
            let outcome = match mode {
                ChatMode::Chat => assistant.chat(text, options).await?,
                ChatMode::Solo => assistant.solo(text, options).await?,
                ChatMode::Discuss => assistant.discuss(text, options).await?,
                ChatMode::Decide => assistant.decide(text, options).await?,
            };
            Ok(outcome)
        }
    })
}

pub fn chat(prompt: impl Into<Prompt>, options: ChatOptions) -> Step {
    chat_step(ChatMode::Chat, prompt, options)
}

pub fn solo(prompt: impl Into<Prompt>, options: ChatOptions) -> Step {
    chat_step(ChatMode::Solo, prompt, options)
}

pub fn discuss(prompt: impl Into<Prompt>, options: ChatOptions) -> Step {
    chat_step(ChatMode::Discuss, prompt, options)
}

pub fn decide(prompt: impl Into<Prompt>, options: ChatOptions) -> Step {
    chat_step(ChatMode::Decide, prompt, options)
}

fn choice_outcome(kind: ChoiceKind, chat: ChatOutcome) -> Outcome {
    if kind != ChoiceKind::YesNo {
        return Outcome::Chat(chat);
    }
    match chat.result.as_ref().and_then(|result| result.get("choice")) {
        Some(Value::Bool(choice)) => {
            let choice = *choice;
            Outcome::Chat(ChatOutcome {
                result: Some(Value::Bool(choice)),
                ..chat
            })
        }
        _ => Outcome::Error(match &chat.error {
            Some(error) => error.message.clone(),
            None => "yes/no answer carried no boolean `choice`".to_string(),
        }),
    }
}

/// A forced choice of the given kind. `kind` on `options` is overridden.
pub fn choice_step(kind: ChoiceKind, prompt: impl Into<Prompt>, options: ChoiceOptions) -> Step {
    let prompt = prompt.into();
    step(move |ctx: ChainContext| {
        let text = prompt.render(&ctx);
        let options = ChoiceOptions {
            kind,
            ..options.clone()
        };
        async move {
            let assistant = ctx.assistant()?;
            let chat = assistant.choice(text, options).await?;
            Result::Ok(choice_outcome(kind, chat))
        }
    })
}

/// Free-text answer through the text tool.
pub fn answer(prompt: impl Into<Prompt>, options: ChoiceOptions) -> Step {
    choice_step(ChoiceKind::Text, prompt, options)
}

pub fn choose(prompt: impl Into<Prompt>, options: ChoiceOptions) -> Step {
    choice_step(ChoiceKind::Choice, prompt, options)
}

/// Yields the chat reply with `result` narrowed to the boolean answer, so the
/// outcome's truthiness is the answer itself. Text, arguments and calls stay on
/// the reply. A reply without a boolean `choice` becomes [`Outcome::Error`].
pub fn yes_or_no(prompt: impl Into<Prompt>, options: ChoiceOptions) -> Step {
    choice_step(ChoiceKind::YesNo, prompt, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::memory::Memory,
        core::{
            assistant::ChatAssistant,
            capability::{ChatInput, ChatResponse, FunctionCall},
            scripted::ScriptedChat,
        },
    };
    use std::sync::Arc;

    fn ctx_with(script: ScriptedChat) -> ChainContext {
        let assistant = Arc::new(ChatAssistant::new(script));
        ChainContext::new(Memory::new()).with_assistant(Some(assistant))
    }

    #[tokio::test]
    async fn chat_renders_dynamic_prompts() {
        let script = ScriptedChat::new().reply(ChatResponse::text("Hi Dan"));
        let ctx = ctx_with(script.clone());
        ctx.set("user", "Dan");

        let prompt = Prompt::dynamic(|ctx: &ChainContext| {
            let user = ctx.get("user").and_then(|v| v.as_str().map(str::to_string));
            format!("Greet {}", user.unwrap_or_default())
        });
        let outcome = chat(prompt, ChatOptions::new())(ctx).await.unwrap();
        assert_eq!(outcome.as_text(), Some("Hi Dan"));

        let requests = script.requests();
        assert_eq!(requests[0].input, ChatInput::from("Greet Dan"));
    }

    #[tokio::test]
    async fn yes_or_no_yields_a_boolean() {
        let script = ScriptedChat::new()
            .reply(ChatResponse::calls(vec![FunctionCall {
                name: "yes_or_no".into(),
                arguments: r#"{"choice":false}"#.into(),
                call_id: "c1".into(),
            }]))
            .reply(ChatResponse::text("noted"));
        let outcome = yes_or_no("Do you like pizza?", ChoiceOptions::default())(ctx_with(script))
            .await
            .unwrap();
        assert!(!outcome.truthy());
        assert_eq!(outcome.as_value(), Some(&Value::Bool(false)));

        let reply = outcome.as_chat().unwrap();
        assert_eq!(reply.text, "noted");
        assert_eq!(reply.name.as_deref(), Some("yes_or_no"));
        assert_eq!(reply.args, Some(serde_json::json!({"choice": false})));
        assert_eq!(reply.calls.len(), 1);
    }

    #[tokio::test]
    async fn missing_assistant_is_a_config_error() {
        let err = chat("hello", ChatOptions::new())(ChainContext::new(Memory::new()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
