use anyhow::{Context, Result};
use console::style;
use tracing::info;

use llm_action::action::run;
use llm_action::config::{ActionConfig, Inputs};
use llm_action::output::OutputSink;
use llm_action::prompt_template::TemplateEnv;
use llm_action::providers::openai::OpenAiProvider;

pub fn execute(inputs: Inputs) -> Result<()> {
    let env = TemplateEnv::from_process();
    let config = ActionConfig::load(&inputs, &env).context("failed to load configuration")?;

    let provider =
        OpenAiProvider::new(config.provider_config()).context("failed to create LLM client")?;
    let output = run(&config, &provider)?;

    println!("{}", style("--- LLM Response ---").bold().cyan());
    println!("{}", output.response());
    println!("{}", style("--- End Response ---").bold().cyan());

    let sink = OutputSink::from_env();
    sink.write(&output.step_outputs())
        .context("failed to set outputs")?;

    info!(
        outputs = output.outputs.len(),
        total_tokens = output.usage.total_tokens,
        "outputs written"
    );
    Ok(())
}
