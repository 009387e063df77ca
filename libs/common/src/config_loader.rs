//! Configuration loading
//!
//! A single file (format chosen by extension) is the base layer; environment
//! variables prefixed with `GRIDPOLL_` override it. Nested keys use `__`:
//! `GRIDPOLL_POLL_INTERVAL_SECS=30`, `GRIDPOLL_LOGGING__LEVEL=debug`.

use errors::{GridpollError, GridpollResult};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "GRIDPOLL_";

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> GridpollResult<Self> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                GridpollError::Configuration(format!(
                    "Config file must have an extension: {}",
                    path.display()
                ))
            })?;

        match extension.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(GridpollError::Configuration(format!(
                "Unsupported config file format: {}",
                other
            ))),
        }
    }
}

/// Build the layered figment for `path` without extracting it
pub fn figment_for(path: &Path, env_prefix: &str) -> GridpollResult<Figment> {
    let figment = match ConfigFormat::from_path(path)? {
        ConfigFormat::Yaml => Figment::new().merge(Yaml::file(path)),
        ConfigFormat::Toml => Figment::new().merge(Toml::file(path)),
        ConfigFormat::Json => Figment::new().merge(Json::file(path)),
    };
    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load configuration from a specific file, then apply `GRIDPOLL_` overrides
pub fn load_config_from_file<T, P>(path: P) -> GridpollResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(GridpollError::FileNotFound(path.display().to_string()));
    }

    debug!("Loading configuration from {}", path.display());
    figment_for(path, ENV_PREFIX)?
        .extract()
        .map_err(|e| GridpollError::ParseError {
            file: path.display().to_string(),
            error: e.to_string(),
        })
}
