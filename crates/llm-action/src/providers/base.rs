use serde::{Deserialize, Serialize};

use super::types::message::{Message, ToolCall};
use crate::errors::ProviderError;
use crate::output::OutputMap;
use crate::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Token counters as step outputs, named the way the API names them.
    pub fn to_outputs(&self) -> OutputMap {
        [
            ("prompt_tokens", self.input_tokens),
            ("completion_tokens", self.output_tokens),
            ("total_tokens", self.total_tokens),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v.to_string())))
        .collect()
    }
}

/// Everything needed for one chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When set, the model is forced to call this function.
    pub tool: Option<Tool>,
}

/// The first choice of a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Base trait for chat completion backends
pub trait Provider {
    fn complete(&self, request: &ChatRequest) -> Result<(Completion, Usage), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_usage_serialization() -> anyhow::Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));

        Ok(())
    }

    #[test]
    fn test_usage_to_outputs() {
        let outputs = Usage::new(Some(12), Some(30), Some(42)).to_outputs();
        assert_eq!(outputs["prompt_tokens"], "12");
        assert_eq!(outputs["completion_tokens"], "30");
        assert_eq!(outputs["total_tokens"], "42");

        let partial = Usage::new(None, Some(5), None).to_outputs();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial["completion_tokens"], "5");
    }
}
