// prompt.rs

use crate::content::resolve;
use crate::errors::{PromptError, ResolveError};
use crate::prompt_template::{render_template, TemplateEnv};

/// Resolve a prompt source (text, file or URL) and render it as a template.
pub fn load_prompt(input: &str, env: &TemplateEnv) -> Result<String, PromptError> {
    if input.is_empty() {
        return Ok(String::new());
    }

    let content = resolve(input)?;
    let rendered = render_template(&content.text, env)?;
    Ok(rendered)
}

/// Resolve a source without template rendering. Certificates and similar
/// material may legitimately contain `{{`.
pub fn load_content(input: &str) -> Result<String, ResolveError> {
    Ok(resolve(input)?.text)
}
