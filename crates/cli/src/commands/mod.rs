pub mod run;
pub mod serve;
pub mod status;

use std::sync::Arc;

use harness_agent::{AgentLoop, TranscriptListener};
use harness_config::AppConfig;
use harness_core::event::EventListener;
use harness_providers::AnthropicProvider;

/// Wrap `listener` in a transcript writer when one is configured.
pub(crate) fn with_transcript(
    config: &AppConfig,
    listener: Arc<dyn EventListener>,
) -> Result<Arc<dyn EventListener>, Box<dyn std::error::Error>> {
    let Some(path) = &config.logging.transcript_path else {
        return Ok(listener);
    };
    let transcript = TranscriptListener::open(path, config.logging.transcript_format, listener)
        .map_err(|e| format!("Failed to open transcript {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Writing agent transcript");
    Ok(Arc::new(transcript))
}

/// Build the provider, tools and agent loop described by `config`.
pub(crate) fn build_agent(
    config: &AppConfig,
    listener: Arc<dyn EventListener>,
) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let api_key = config.require_api_key()?;

    let mut provider =
        AnthropicProvider::new(api_key)?.with_base_url(config.provider.base_url.clone());
    if let Some(budget) = config.provider.thinking_budget {
        provider = provider.with_extended_thinking(budget);
    }

    let tools = Arc::new(harness_tools::default_registry());

    Ok(AgentLoop::new(
        Arc::new(provider),
        config.model.clone(),
        tools,
        with_transcript(config, listener)?,
    )
    .with_max_tokens(config.max_tokens)
    .with_max_turns(config.max_turns)
    .with_system_prompt(config.system_prompt.clone()))
}
