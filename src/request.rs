//! Completion request assembly

use serde::{Deserialize, Serialize};

use crate::{message::Message, Error, Result};

/// Models the relay accepts from browsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelSelector {
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[default]
    #[serde(rename = "gpt-4")]
    Gpt4,
}

impl ModelSelector {
    /// All selectable models
    pub const ALL: [ModelSelector; 2] = [ModelSelector::Gpt35Turbo, ModelSelector::Gpt4];

    /// Model identifier sent upstream
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelector::Gpt35Turbo => "gpt-3.5-turbo",
            ModelSelector::Gpt4 => "gpt-4",
        }
    }

    /// Output token cap for this model
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            ModelSelector::Gpt35Turbo => 1000,
            ModelSelector::Gpt4 => 4000,
        }
    }
}

/// Body of the upstream chat-completion call.
///
/// Built once per relay through [`CompletionRequest::new`]; the generation
/// parameters are fixed and `stream` is always `true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
    stream: bool,
    n: u32,
}

impl CompletionRequest {
    /// Build a streamed request for `model` over the given conversation.
    ///
    /// Fails when the conversation is empty or any message breaks the
    /// content/name rules.
    pub fn new(model: ModelSelector, messages: Vec<Message>) -> Result<Self> {
        if messages.is_empty() {
            return Err(Error::Validation(
                "conversation must contain at least one message".to_string(),
            ));
        }
        for message in &messages {
            message.validate()?;
        }

        Ok(CompletionRequest {
            model: model.as_str().to_string(),
            messages,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: model.max_output_tokens(),
            stream: true,
            n: 1,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
