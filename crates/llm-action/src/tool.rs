use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::errors::ToolSchemaError;

/// A function the model is forced to call so that its answer comes back as
/// structured arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the function
    pub name: String,
    /// What the function is for, shown to the model
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

// Every field is optional on the wire so that a missing or null name is a
// validation error rather than a JSON error.
#[derive(Deserialize)]
struct RawTool {
    name: Option<String>,
    description: Option<String>,
    parameters: Option<Value>,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The OpenAI `tools[]` entry for this function.
    pub fn to_openai_spec(&self) -> Value {
        let mut function = json!({
            "name": self.name,
            "description": self.description,
        });
        if !self.parameters.is_null() {
            function["parameters"] = self.parameters.clone();
        }

        json!({
            "type": "function",
            "function": function,
        })
    }

    /// A `tool_choice` that leaves the model no option but to call this
    /// function.
    pub fn forced_choice(&self) -> Value {
        json!({
            "type": "function",
            "function": { "name": self.name },
        })
    }
}

/// Parse a tool schema. An empty schema disables tool calling.
pub fn parse_tool_schema(schema: &str) -> Result<Option<Tool>, ToolSchemaError> {
    if schema.is_empty() {
        return Ok(None);
    }

    let raw: RawTool = serde_json::from_str(schema).map_err(ToolSchemaError::Parse)?;
    let name = raw.name.unwrap_or_default();
    if name.is_empty() {
        return Err(ToolSchemaError::MissingName);
    }

    Ok(Some(Tool {
        name,
        description: raw.description.unwrap_or_default(),
        parameters: raw.parameters.unwrap_or(Value::Null),
    }))
}

/// Flatten function-call arguments into string outputs. Strings pass
/// through as-is; every other value is re-encoded as canonical compact JSON.
pub fn parse_function_arguments(
    arguments: &str,
) -> Result<BTreeMap<String, String>, ToolSchemaError> {
    if arguments.is_empty() {
        return Ok(BTreeMap::new());
    }

    let parsed: Value = serde_json::from_str(arguments).map_err(ToolSchemaError::Arguments)?;
    let object = match parsed {
        Value::Object(object) => object,
        Value::Null => return Ok(BTreeMap::new()),
        Value::Array(_) => return Err(ToolSchemaError::NotAnObject("an array")),
        Value::String(_) => return Err(ToolSchemaError::NotAnObject("a string")),
        Value::Number(_) => return Err(ToolSchemaError::NotAnObject("a number")),
        Value::Bool(_) => return Err(ToolSchemaError::NotAnObject("a boolean")),
    };

    let mut output = BTreeMap::new();
    for (key, value) in object {
        let flattened = match value {
            Value::String(text) => text,
            other => {
                let mut encoded = String::new();
                write_canonical(&other, &mut encoded).map_err(|source| {
                    ToolSchemaError::ArgumentValue {
                        key: key.clone(),
                        source,
                    }
                })?;
                encoded
            }
        };
        output.insert(key, flattened);
    }

    Ok(output)
}

/// Compact JSON whose numbers are written the way Go's encoder writes
/// them: whole floats drop their fraction and exponents only appear below
/// 1e-6 or from 1e21 up.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Number(number) => out.push_str(&canonical_number(number)),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(object) => {
            out.push('{');
            for (index, (key, item)) in object.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        other => out.push_str(&serde_json::to_string(other)?),
    }
    Ok(())
}

fn canonical_number(number: &serde_json::Number) -> String {
    if number.is_i64() || number.is_u64() {
        return number.to_string();
    }
    let Some(float) = number.as_f64() else {
        return number.to_string();
    };

    let magnitude = float.abs();
    if magnitude == 0.0 || (1e-6..1e21).contains(&magnitude) {
        // Display is shortest round-trip and never uses an exponent
        return format!("{}", float);
    }

    let formatted = format!("{:e}", float);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_schema_empty() {
        assert_eq!(parse_tool_schema("").unwrap(), None);
    }

    #[test]
    fn test_parse_tool_schema_valid() {
        let schema = r#"{
            "name": "get_city_info",
            "description": "Get information about a city",
            "parameters": {
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "country": {"type": "string"}
                },
                "required": ["city", "country"]
            }
        }"#;

        let tool = parse_tool_schema(schema).unwrap().unwrap();
        assert_eq!(tool.name, "get_city_info");
        assert_eq!(tool.description, "Get information about a city");
        assert_eq!(tool.parameters["type"], "object");
        assert_eq!(tool.parameters["required"], json!(["city", "country"]));
    }

    #[test]
    fn test_parse_tool_schema_missing_name() {
        for schema in [
            r#"{"description":"x"}"#,
            r#"{"name":"","parameters":{}}"#,
            r#"{"name":null}"#,
        ] {
            let err = parse_tool_schema(schema).unwrap_err();
            assert!(matches!(err, ToolSchemaError::MissingName), "{}", schema);
            assert_eq!(err.to_string(), "tool_schema must have a 'name' field");
        }
    }

    #[test]
    fn test_parse_tool_schema_invalid_json() {
        for schema in ["not json", r#"{"name": "x""#, "[1, 2]"] {
            assert!(matches!(
                parse_tool_schema(schema),
                Err(ToolSchemaError::Parse(_))
            ));
        }
    }

    #[test]
    fn test_parse_tool_schema_unicode() {
        let schema = r#"{"name": "get_info", "description": "取得資訊 - 获取信息", "parameters": {"type": "object"}}"#;
        let tool = parse_tool_schema(schema).unwrap().unwrap();
        assert_eq!(tool.description, "取得資訊 - 获取信息");
    }

    #[test]
    fn test_to_openai_spec() {
        let tool = Tool::new(
            "code_review",
            "Structured code review",
            json!({"type": "object", "properties": {"score": {"type": "integer"}}}),
        );

        let spec = tool.to_openai_spec();
        assert_eq!(spec["type"], "function");
        assert_eq!(spec["function"]["name"], "code_review");
        assert_eq!(spec["function"]["description"], "Structured code review");
        assert_eq!(
            spec["function"]["parameters"]["properties"]["score"]["type"],
            "integer"
        );

        let choice = tool.forced_choice();
        assert_eq!(choice, json!({"type": "function", "function": {"name": "code_review"}}));
    }

    #[test]
    fn test_to_openai_spec_minimal() {
        let tool = parse_tool_schema(r#"{"name":"minimal"}"#).unwrap().unwrap();
        let spec = tool.to_openai_spec();
        assert_eq!(spec["function"]["name"], "minimal");
        assert_eq!(spec["function"]["description"], "");
        assert!(spec["function"].get("parameters").is_none());
    }

    #[test]
    fn test_parse_function_arguments() {
        let cases: &[(&str, &[(&str, &str)])] = &[
            (r#"{"city": "Paris", "country": "France"}"#, &[("city", "Paris"), ("country", "France")]),
            (r#"{"score":8,"ok":true,"city":"Paris"}"#, &[("score", "8"), ("ok", "true"), ("city", "Paris")]),
            (r#"{"is_valid": true, "is_error": false}"#, &[("is_valid", "true"), ("is_error", "false")]),
            (r#"{"issues": ["bug1", "bug2"], "name": "review"}"#, &[("issues", r#"["bug1","bug2"]"#), ("name", "review")]),
            (r#"{"metadata": {"lang": "go", "version": 1}}"#, &[("metadata", r#"{"lang":"go","version":1}"#)]),
            (r#"{"temperature": 0.7}"#, &[("temperature", "0.7")]),
            (r#"{"score":8.0,"big":1e3}"#, &[("score", "8"), ("big", "1000")]),
            (r#"{"scores":[1.0,2.5,-3.0],"meta":{"weight":2.0}}"#, &[("scores", "[1,2.5,-3]"), ("meta", r#"{"weight":2}"#)]),
            (r#"{"huge":1e21,"tiny":1e-7,"small":0.000001,"wide":1e20}"#, &[("huge", "1e+21"), ("tiny", "1e-7"), ("small", "0.000001"), ("wide", "100000000000000000000")]),
            (r#"{"optional": null, "name": "test"}"#, &[("optional", "null"), ("name", "test")]),
            ("{}", &[]),
            ("", &[]),
            ("null", &[]),
        ];

        for (input, expected) in cases {
            let output = parse_function_arguments(input).unwrap();
            let expected: BTreeMap<String, String> = expected
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            assert_eq!(output, expected, "arguments {}", input);
        }
    }

    #[test]
    fn test_parse_function_arguments_errors() {
        assert!(matches!(
            parse_function_arguments("not valid json"),
            Err(ToolSchemaError::Arguments(_))
        ));
        assert!(matches!(
            parse_function_arguments(r#"{"key": "value""#),
            Err(ToolSchemaError::Arguments(_))
        ));
        assert!(matches!(
            parse_function_arguments(r#"["a", "b"]"#),
            Err(ToolSchemaError::NotAnObject("an array"))
        ));
        assert!(matches!(
            parse_function_arguments("42"),
            Err(ToolSchemaError::NotAnObject("a number"))
        ));
    }

    #[test]
    fn test_string_values_pass_through_verbatim() {
        let input = json!({
            "summary": "line one\nline \"two\"",
            "emoji": "✅ done",
            "json_looking": "{\"a\":1}",
        });
        let output = parse_function_arguments(&input.to_string()).unwrap();
        for (key, value) in input.as_object().unwrap() {
            assert_eq!(&json!(output[key]), value);
        }
    }
}
