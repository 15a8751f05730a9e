use std::{env, path::PathBuf, str::FromStr};

use crate::error::ConfigError;

pub const DEFAULT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Settings for the hosted classification model.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_url: String,
    pub api_key: String,
    pub workspace: String,
    pub project: String,
    pub version: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub upload_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub database_url: String,
    pub database_max_connections: u32,
    pub classifier: ClassifierConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, falling back to
    /// defaults for everything except the API key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let body_limit_mb: usize = parse_or(&lookup, "BODY_LIMIT_MB", 5)?;
        let port = parse_or(&lookup, "PORT", 5000)?;

        let allowed_extensions = match lookup("ALLOWED_EXTENSIONS") {
            Some(raw) => parse_extensions(&raw)
                .filter(|exts| !exts.is_empty())
                .ok_or(ConfigError::Invalid {
                    key: "ALLOWED_EXTENSIONS",
                    value: raw,
                })?,
            None => DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        };

        let api_key = lookup("ROBOFLOW_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("ROBOFLOW_API_KEY"))?;

        Ok(Config {
            port,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            upload_dir: PathBuf::from(string_or("UPLOAD_DIR", "static/uploads")),
            allowed_extensions,
            database_url: string_or("DATABASE_URL", "sqlite://banana_ripeness.db"),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            classifier: ClassifierConfig {
                api_url: string_or("ROBOFLOW_API_URL", "https://classify.roboflow.com"),
                api_key,
                workspace: string_or("ROBOFLOW_WORKSPACE", "banana-yrnos"),
                project: string_or("ROBOFLOW_PROJECT", "banana-ripeness-detection-lbydz"),
                version: parse_or(&lookup, "ROBOFLOW_VERSION", 2)?,
                timeout_secs: parse_or(&lookup, "ROBOFLOW_TIMEOUT_SECS", 30)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Splits a comma separated extension list. Returns `None` when an entry is
/// blank or still carries a dot.
fn parse_extensions(raw: &str) -> Option<Vec<String>> {
    raw.split(',')
        .map(|ext| ext.trim().to_ascii_lowercase())
        .map(|ext| (!ext.is_empty() && !ext.contains('.')).then_some(ext))
        .collect()
}
