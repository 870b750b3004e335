//! `agentflow config`: Show the effective configuration.

use agentflow_config::AppConfig;
use anyhow::Context;

/// Print the loaded config (file + environment overrides) as TOML. Secrets
/// are masked.
pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    println!("{}", render(&config)?);
    Ok(())
}

pub fn path() -> anyhow::Result<()> {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    Ok(())
}

fn render(config: &AppConfig) -> anyhow::Result<String> {
    let mut masked = config.clone();
    for key in [
        &mut masked.api_key,
        &mut masked.models.conversation.api_key,
        &mut masked.models.tool_call.api_key,
    ] {
        if key.is_some() {
            *key = Some("[REDACTED]".into());
        }
    }
    toml::to_string_pretty(&masked).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn rendered_config_masks_keys() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret".into());
        config.models.tool_call.api_key = Some("sk-other".into());

        let rendered = render(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("sk-other"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("gpt-4o-mini"));
    }
}
