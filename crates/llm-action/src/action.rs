//! One action run: build the chat request, call the provider once and turn
//! the answer into step outputs.

use tracing::{info, warn};

use crate::config::ActionConfig;
use crate::errors::{ActionResult, ProviderError};
use crate::output::{build_output_map, OutputMap, RESPONSE_KEY};
use crate::providers::base::{ChatRequest, Provider, Usage};
use crate::providers::types::message::Message;
use crate::tool::parse_function_arguments;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    /// `response` plus any decoded tool arguments
    pub outputs: OutputMap,
    pub usage: Usage,
}

impl ActionOutput {
    pub fn response(&self) -> &str {
        self.outputs
            .get(RESPONSE_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Outputs merged with the token counters. Counters never replace an
    /// output that is already present.
    pub fn step_outputs(&self) -> OutputMap {
        let mut outputs = self.outputs.clone();
        for (name, value) in self.usage.to_outputs() {
            outputs.entry(name).or_insert(value);
        }
        outputs
    }
}

/// System message first when one is configured, then the user prompt.
pub fn build_messages(config: &ActionConfig) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &config.system_prompt {
        messages.push(Message::system(system.as_str()));
    }
    messages.push(Message::user(config.input_prompt.as_str()));
    messages
}

pub fn build_request(config: &ActionConfig) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: build_messages(config),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        tool: config.tool.clone(),
    }
}

pub fn run<P: Provider + ?Sized>(config: &ActionConfig, provider: &P) -> ActionResult<ActionOutput> {
    let request = build_request(config);
    let (completion, usage) = provider.complete(&request)?;

    let (outputs, collided) = match &config.tool {
        Some(tool) => {
            let call = completion
                .tool_calls
                .first()
                .ok_or_else(|| ProviderError::NoToolCall(tool.name.clone()))?;
            let arguments = parse_function_arguments(&call.arguments)?;
            info!(function = %call.name, fields = arguments.len(), "received tool call");
            build_output_map(&call.arguments, Some(&arguments))
        }
        None => build_output_map(completion.content.as_deref().unwrap_or_default(), None),
    };

    if collided {
        warn!(
            "tool schema defines a '{}' field which conflicts with the reserved output; \
             the raw response is kept",
            RESPONSE_KEY
        );
    }

    Ok(ActionOutput { outputs, usage })
}
