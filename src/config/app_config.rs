use std::env;
use std::io;

use thiserror::Error;

use super::model::{Config, ProbeMode};

const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    Override { key: &'static str, value: String },
}

/// Load the application configuration from a YAML file and environment variables.
/// The file named by `CONFIG_FILE` must exist; the default `config.yml` may be
/// absent, in which case built-in defaults are used. Environment overrides are
/// applied last.
pub fn load_config() -> Result<Config, ConfigError> {
    let explicit = env::var("CONFIG_FILE").ok();
    let location = explicit
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let mut config = match std::fs::read_to_string(&location) {
        Ok(config_str) => {
            log::info!("Using config file: {}", location);
            serde_yaml::from_str(&config_str).map_err(|source| ConfigError::Yaml {
                path: location.clone(),
                source,
            })?
        }
        Err(e) if explicit.is_none() && e.kind() == io::ErrorKind::NotFound => {
            log::info!("No {} found, using defaults", location);
            Config::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: location,
                source,
            });
        }
    };

    apply_env_overrides(&mut config, |key| env::var(key).ok())?;
    Ok(config)
}

/// Overrides config values with `LISTEN_ADDR`, `PROBE_MODE`, `PROXY_ENDPOINT`
/// and `PROBE_TIMEOUT_SECONDS` when `lookup` yields them.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(listen) = lookup("LISTEN_ADDR") {
        config.listen = listen;
    }

    if let Some(mode) = lookup("PROBE_MODE") {
        config.probe.mode = match mode.trim().to_ascii_lowercase().as_str() {
            "direct" => ProbeMode::Direct,
            "proxy" => ProbeMode::Proxy,
            _ => {
                return Err(ConfigError::Override {
                    key: "PROBE_MODE",
                    value: mode,
                });
            }
        };
    }

    if let Some(endpoint) = lookup("PROXY_ENDPOINT") {
        config.probe.proxy_endpoint = endpoint;
    }

    if let Some(timeout) = lookup("PROBE_TIMEOUT_SECONDS") {
        config.probe.timeout_seconds = timeout.trim().parse().map_err(|_| ConfigError::Override {
            key: "PROBE_TIMEOUT_SECONDS",
            value: timeout,
        })?;
    }

    Ok(())
}
