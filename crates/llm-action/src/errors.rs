use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a prompt/content source into text.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to fetch URL {url}: status code {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("failed to fetch URL {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read file {}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum TemplateError {
    /// The Go-style action syntax could not be parsed.
    #[error("failed to parse template: line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("failed to parse template")]
    Compile(#[source] tera::Error),

    #[error("failed to execute template")]
    Execute(#[source] tera::Error),
}

/// Either half of the prompt pipeline can fail.
#[derive(Error, Debug)]
pub enum PromptError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Error, Debug)]
pub enum ToolSchemaError {
    #[error("failed to parse tool_schema JSON")]
    Parse(#[source] serde_json::Error),

    #[error("tool_schema must have a 'name' field")]
    MissingName,

    #[error("failed to parse function arguments")]
    Arguments(#[source] serde_json::Error),

    #[error("failed to parse function arguments: expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("failed to marshal value for key '{key}'")]
    ArgumentValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingInput(&'static str),

    #[error("failed to load {input}")]
    Load {
        input: &'static str,
        #[source]
        source: PromptError,
    },

    #[error("failed to load tool_schema")]
    ToolSchema(#[source] ToolSchemaError),

    #[error("invalid header format: {0:?} (expected 'Key:Value')")]
    InvalidHeader(String),

    #[error("empty header key in: {0:?}")]
    EmptyHeaderKey(String),
}

/// Errors raised while talking to the chat completion endpoint.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("failed to parse CA certificate")]
    InvalidCertificate,

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("chat completion error")]
    Transport(#[from] reqwest::Error),

    #[error("chat completion error: status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("chat completion error: {0}")]
    Api(String),

    #[error("input message too long: {0}")]
    ContextLengthExceeded(String),

    #[error("no response from LLM")]
    NoChoices,

    #[error("no tool call in response for function '{0}'")]
    NoToolCall(String),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write output file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write outputs")]
    Stream(#[source] std::io::Error),

    #[error("output '{name}' contains the generated delimiter")]
    DelimiterCollision { name: String },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    ToolSchema(#[from] ToolSchemaError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type ActionResult<T> = Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_messages_say_failed_to() {
        let err = TemplateError::Syntax {
            line: 3,
            message: "unclosed action".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse template: line 3: unclosed action"
        );
    }

    #[test]
    fn test_config_error_wraps_source() {
        let err = ConfigError::Load {
            input: "input_prompt",
            source: PromptError::Resolve(ResolveError::FetchStatus {
                url: "http://example.com/p.txt".to_string(),
                status: 404,
            }),
        };
        assert_eq!(err.to_string(), "failed to load input_prompt");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(
            source.to_string(),
            "failed to fetch URL http://example.com/p.txt: status code 404"
        );
    }

    #[test]
    fn test_header_errors_quote_pair() {
        assert_eq!(
            ConfigError::InvalidHeader("NoColon".to_string()).to_string(),
            "invalid header format: \"NoColon\" (expected 'Key:Value')"
        );
    }
}
