use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use mmw_config::ClientConfig;
use mmw_config::paths;

use crate::cli::OutputFormat;

const REDACTED: &str = "<redacted>";

/// Effective configuration: `explicit` (or the default location), then
/// environment overrides, then `--staging`.
pub(crate) fn load_config(explicit: Option<&Path>, staging: bool) -> Result<ClientConfig> {
    let mut config = match explicit {
        Some(path) => {
            let mut config = ClientConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => ClientConfig::load()?,
    };
    if staging {
        config.service.use_staging = true;
    }
    config.validate()?;
    Ok(config)
}

fn target_path(explicit: Option<&Path>) -> Result<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(paths::config_path)
        .ok_or_else(|| anyhow!("Cannot determine config directory; pass --config"))
}

pub(crate) fn handle_config_show(config: &ClientConfig, format: OutputFormat) -> Result<()> {
    let config = redacted(config);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Text => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

pub(crate) fn handle_config_init(explicit: Option<&Path>) -> Result<()> {
    let path = target_path(explicit)?;
    ClientConfig::write_template(&path)?;
    eprintln!("Wrote config template to: {}", path.display());
    eprintln!("  Set service.api_key (or MMW_API_KEY) before running jobs.");
    Ok(())
}

pub(crate) fn handle_config_path(explicit: Option<&Path>) -> Result<()> {
    println!("{}", target_path(explicit)?.display());
    Ok(())
}

fn redacted(config: &ClientConfig) -> ClientConfig {
    let mut config = config.clone();
    if config.service.api_key.is_some() {
        config.service.api_key = Some(REDACTED.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = ClientConfig::default();
        config.service.api_key = Some("secret".into());
        let shown = redacted(&config);
        assert_eq!(shown.service.api_key.as_deref(), Some(REDACTED));
        assert_eq!(config.service.api_key.as_deref(), Some("secret"));

        let shown = redacted(&ClientConfig::default());
        assert!(shown.service.api_key.is_none());
    }

    #[test]
    fn test_load_config_applies_staging_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[polling]\ninterval_ms = 50\n").unwrap();

        let config = load_config(Some(&path), true).unwrap();
        assert!(config.service.use_staging);
        assert_eq!(config.polling.interval_ms, 50);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(load_config(Some(&path), false).is_err());
    }

    #[test]
    fn test_init_writes_loadable_template() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        handle_config_init(Some(&path)).unwrap();
        assert!(ClientConfig::load_from(&path).is_ok());
        assert!(handle_config_init(Some(&path)).is_err());
    }
}
