use serde_json::{json, Value};

use super::base::{Completion, Usage};
use super::types::message::{Message, ToolCall};
use crate::errors::ProviderError;

/// Convert messages to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role,
                "content": message.content,
            })
        })
        .collect()
}

/// Take the first choice of an OpenAI response.
pub fn openai_response_to_completion(response: &Value) -> Result<Completion, ProviderError> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .map(|choice| &choice["message"])
        .ok_or(ProviderError::NoChoices)?;

    let content = message
        .get("content")
        .and_then(|text| text.as_str())
        .map(str::to_string);

    let tool_calls = message
        .get("tool_calls")
        .and_then(|calls| calls.as_array())
        .map(|calls| {
            calls
                .iter()
                .map(|call| ToolCall {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: call["function"]["name"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    arguments: call["function"]["arguments"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Completion {
        content,
        tool_calls,
    })
}

pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}

/// Token counters from the `usage` block. A missing block yields empty usage.
pub fn get_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };

    let counter = |name: &str| usage.get(name).and_then(|v| v.as_i64()).map(|v| v as i32);

    let input_tokens = counter("prompt_tokens");
    let output_tokens = counter("completion_tokens");
    let total_tokens = counter("total_tokens").or(match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "get_city_info",
                        "arguments": "{\"city\": \"Paris\"}"
                    }
                }]
            }
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    #[test]
    fn test_messages_to_openai_spec() {
        let spec = messages_to_openai_spec(&[
            Message::system("You are a helpful assistant."),
            Message::user("Hello"),
        ]);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["role"], "system");
        assert_eq!(spec[0]["content"], "You are a helpful assistant.");
        assert_eq!(spec[1]["role"], "user");
        assert_eq!(spec[1]["content"], "Hello");
    }

    #[test]
    fn test_openai_response_to_completion_text() -> anyhow::Result<()> {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello from John Cena!"},
                "finish_reason": "stop"
            }]
        });

        let completion = openai_response_to_completion(&response)?;
        assert_eq!(completion.content.as_deref(), Some("Hello from John Cena!"));
        assert!(completion.tool_calls.is_empty());
        Ok(())
    }

    #[test]
    fn test_openai_response_to_completion_tool_call() -> anyhow::Result<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        let completion = openai_response_to_completion(&response)?;

        assert_eq!(completion.content, None);
        assert_eq!(
            completion.tool_calls,
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_city_info".to_string(),
                arguments: "{\"city\": \"Paris\"}".to_string(),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_openai_response_without_choices() {
        for response in [json!({"choices": []}), json!({"id": "x"})] {
            assert!(matches!(
                openai_response_to_completion(&response),
                Err(ProviderError::NoChoices)
            ));
        }
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });

        let result = check_openai_context_length_error(&error);
        assert!(matches!(
            result,
            Some(ProviderError::ContextLengthExceeded(ref message)) if message == "This message is too long"
        ));

        let error = json!({"code": "other_error", "message": "Some other error"});
        assert!(check_openai_context_length_error(&error).is_none());
    }

    #[test]
    fn test_get_usage() -> anyhow::Result<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE)?;
        assert_eq!(get_usage(&response), Usage::new(Some(10), Some(25), Some(35)));

        let computed = json!({"usage": {"prompt_tokens": 4, "completion_tokens": 6}});
        assert_eq!(get_usage(&computed), Usage::new(Some(4), Some(6), Some(10)));

        assert_eq!(get_usage(&json!({})), Usage::default());
        Ok(())
    }
}
