pub mod action;
pub mod config;
pub mod content;
pub mod errors;
pub mod output;
pub mod prompt;
pub mod prompt_template;
pub mod providers;
pub mod tool;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sent as `X-Action-Name` with every completion request.
pub const ACTION_NAME: &str = "appleboy/LLM-action";

pub const USER_AGENT: &str = concat!("LLM-action/", env!("CARGO_PKG_VERSION"));
