//! `harness status`: Show the effective configuration.

use harness_config::AppConfig;

fn render(config: &AppConfig) -> String {
    let api_key = if config.require_api_key().is_ok() {
        "set (redacted)"
    } else {
        "missing (set ANTHROPIC_API_KEY)"
    };
    let system = if config.system_prompt.is_empty() {
        "none".to_string()
    } else {
        format!("{} chars", config.system_prompt.chars().count())
    };
    let transcript = config
        .logging
        .transcript_path
        .as_ref()
        .map(|p| format!("{} ({:?})", p.display(), config.logging.transcript_format))
        .unwrap_or_else(|| "off".into());

    let config_path = AppConfig::config_dir().join("config.toml");
    let config_file = if config_path.exists() {
        format!("{}", config_path.display())
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };

    [
        "Harness Status".to_string(),
        "==============".to_string(),
        format!("  Config file:  {config_file}"),
        format!("  API key:      {api_key}"),
        format!("  Base URL:     {}", config.provider.base_url),
        format!("  Model:        {}", config.model),
        format!("  Max tokens:   {}", config.max_tokens),
        format!("  Max turns:    {}", config.max_turns),
        format!("  System:       {system}"),
        format!("  Gateway:      {}", config.gateway.addr()),
        format!(
            "  Log level:    {} ({:?})",
            config.logging.level, config.logging.format
        ),
        format!("  Transcript:   {transcript}"),
    ]
    .join("\n")
}

pub fn run(config: &AppConfig) {
    println!("{}", render(config));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_prints_the_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let out = render(&config);
        assert!(!out.contains("sk-ant-secret"));
        assert!(out.contains("set (redacted)"));
    }

    #[test]
    fn reports_missing_key_and_defaults() {
        let out = render(&AppConfig::default());
        assert!(out.contains("missing"));
        assert!(out.contains("0.0.0.0:8080"));
        assert!(out.contains("Transcript:   off"));
    }
}
