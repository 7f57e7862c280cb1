use clap::{ArgAction, Parser};
use console::style;
use tracing_subscriber::{fmt, EnvFilter};

use llm_action::config::{Inputs, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use llm_action::providers::openai::OPENAI_DEFAULT_HOST;

mod commands;

/// Send a prompt to an OpenAI-compatible chat completion API and expose the
/// answer as step outputs.
///
/// Every option can also be passed through its `INPUT_*` environment
/// variable; an empty variable counts as unset.
#[derive(Parser, Debug)]
#[command(name = "llm-action", author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the API
    #[arg(long, env = "INPUT_BASE_URL", default_value = OPENAI_DEFAULT_HOST)]
    base_url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "INPUT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model to use
    #[arg(long, env = "INPUT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Accept any server certificate
    #[arg(
        long,
        env = "INPUT_SKIP_SSL_VERIFY",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_flag
    )]
    skip_ssl_verify: bool,

    /// CA certificate as PEM text, a file path or a URL
    #[arg(long, env = "INPUT_CA_CERT")]
    ca_cert: Option<String>,

    /// System prompt as text, a file path or a URL
    #[arg(long, env = "INPUT_SYSTEM_PROMPT")]
    system_prompt: Option<String>,

    /// User prompt as text, a file path or a URL
    #[arg(long, env = "INPUT_INPUT_PROMPT")]
    input_prompt: Option<String>,

    /// JSON function schema for structured output
    #[arg(long, env = "INPUT_TOOL_SCHEMA")]
    tool_schema: Option<String>,

    #[arg(
        long,
        env = "INPUT_TEMPERATURE",
        default_value_t = DEFAULT_TEMPERATURE,
        value_parser = parse_temperature
    )]
    temperature: f32,

    #[arg(
        long,
        env = "INPUT_MAX_TOKENS",
        default_value_t = DEFAULT_MAX_TOKENS,
        value_parser = parse_max_tokens
    )]
    max_tokens: u32,

    /// Log configuration and request payloads
    #[arg(
        long,
        env = "INPUT_DEBUG",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_flag
    )]
    debug: bool,

    /// Extra request headers, `Key:Value` separated by commas or newlines
    #[arg(long, env = "INPUT_HEADERS")]
    headers: Option<String>,
}

impl Cli {
    fn into_inputs(self) -> Inputs {
        Inputs {
            base_url: self.base_url,
            api_key: self.api_key.unwrap_or_default(),
            model: self.model,
            skip_ssl_verify: self.skip_ssl_verify,
            ca_cert: self.ca_cert.unwrap_or_default(),
            system_prompt: self.system_prompt.unwrap_or_default(),
            input_prompt: self.input_prompt.unwrap_or_default(),
            tool_schema: self.tool_schema.unwrap_or_default(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            debug: self.debug,
            headers: self.headers.unwrap_or_default(),
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
        "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
        other => Err(format!("invalid boolean value: {:?}", other)),
    }
}

fn parse_temperature(value: &str) -> Result<f32, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(DEFAULT_TEMPERATURE);
    }
    value
        .parse()
        .map_err(|e| format!("invalid temperature {:?}: {}", value, e))
}

fn parse_max_tokens(value: &str) -> Result<u32, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(DEFAULT_MAX_TOKENS);
    }
    value
        .parse()
        .map_err(|e| format!("invalid max_tokens {:?}: {}", value, e))
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = commands::run::execute(cli.into_inputs()) {
        eprintln!("{} {:#}", style("Error:").red().bold(), err);
        std::process::exit(1);
    }
}
