use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::errors::ConfigError;
use crate::prompt::{load_content, load_prompt};
use crate::prompt_template::TemplateEnv;
use crate::providers::openai::{OpenAiProviderConfig, OPENAI_DEFAULT_HOST};
use crate::tool::{parse_tool_schema, Tool};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Action inputs as the runner hands them over, before any source is
/// resolved. Empty strings mean "not set".
#[derive(Clone, PartialEq)]
pub struct Inputs {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub skip_ssl_verify: bool,
    pub ca_cert: String,
    pub system_prompt: String,
    pub input_prompt: String,
    pub tool_schema: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub debug: bool,
    pub headers: String,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            base_url: OPENAI_DEFAULT_HOST.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            skip_ssl_verify: false,
            ca_cert: String::new(),
            system_prompt: String::new(),
            input_prompt: String::new(),
            tool_schema: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            debug: false,
            headers: String::new(),
        }
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inputs")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("model", &self.model)
            .field("skip_ssl_verify", &self.skip_ssl_verify)
            .field("ca_cert", &self.ca_cert)
            .field("system_prompt", &self.system_prompt)
            .field("input_prompt", &self.input_prompt)
            .field("tool_schema", &self.tool_schema)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("debug", &self.debug)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Fully loaded configuration: every source is resolved and rendered and
/// the tool schema is parsed.
#[derive(Clone)]
pub struct ActionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub skip_ssl_verify: bool,
    pub ca_cert: Option<String>,
    pub system_prompt: Option<String>,
    pub input_prompt: String,
    pub tool: Option<Tool>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub debug: bool,
    pub headers: BTreeMap<String, String>,
}

impl ActionConfig {
    pub fn load(inputs: &Inputs, env: &TemplateEnv) -> Result<Self, ConfigError> {
        if inputs.api_key.is_empty() {
            return Err(ConfigError::MissingInput("api_key"));
        }
        if inputs.input_prompt.is_empty() {
            return Err(ConfigError::MissingInput("input_prompt"));
        }

        let ca_cert = load_content(&inputs.ca_cert).map_err(|e| ConfigError::Load {
            input: "ca_cert",
            source: e.into(),
        })?;
        let system_prompt = load_source("system_prompt", &inputs.system_prompt, env)?;
        let input_prompt = load_source("input_prompt", &inputs.input_prompt, env)?;
        let tool_schema = load_source("tool_schema", &inputs.tool_schema, env)?;
        let tool = parse_tool_schema(&tool_schema).map_err(ConfigError::ToolSchema)?;

        let config = ActionConfig {
            base_url: if inputs.base_url.is_empty() {
                OPENAI_DEFAULT_HOST.to_string()
            } else {
                inputs.base_url.clone()
            },
            api_key: inputs.api_key.clone(),
            model: if inputs.model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                inputs.model.clone()
            },
            skip_ssl_verify: inputs.skip_ssl_verify,
            ca_cert: non_empty(ca_cert),
            system_prompt: non_empty(system_prompt),
            input_prompt,
            tool,
            temperature: inputs.temperature,
            max_tokens: inputs.max_tokens,
            debug: inputs.debug,
            headers: parse_headers(&inputs.headers)?,
        };

        debug!(config = ?config, "loaded configuration");
        Ok(config)
    }

    pub fn provider_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.base_url.clone(),
            api_key: self.api_key.clone(),
            headers: self.headers.clone(),
            ca_cert: self.ca_cert.clone(),
            skip_ssl_verify: self.skip_ssl_verify,
        }
    }
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_api_key(&self.api_key))
            .field("model", &self.model)
            .field("skip_ssl_verify", &self.skip_ssl_verify)
            .field("ca_cert", &self.ca_cert.as_ref().map(|_| "<set>"))
            .field("system_prompt", &self.system_prompt)
            .field("input_prompt", &self.input_prompt)
            .field("tool", &self.tool.as_ref().map(|t| t.name.as_str()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("debug", &self.debug)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn load_source(
    input: &'static str,
    source: &str,
    env: &TemplateEnv,
) -> Result<String, ConfigError> {
    load_prompt(source, env).map_err(|source| ConfigError::Load { input, source })
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse `Key:Value` pairs separated by commas or newlines.
///
/// Only the first colon splits, so values like URLs survive intact.
pub fn parse_headers(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut headers = BTreeMap::new();

    let normalized = raw.replace("\r\n", "\n").replace('\n', ",");
    for pair in normalized.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidHeader(pair.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::EmptyHeaderKey(pair.to_string()));
        }
        headers.insert(key.to_string(), value.trim().to_string());
    }

    Ok(headers)
}

/// Show only the first four characters of a key; short keys are hidden
/// completely.
pub fn mask_api_key(key: &str) -> String {
    if key.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{}****", prefix)
}
