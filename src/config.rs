use crate::error::UsageError;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BASE_URL_ENV: &str = "CLAUDE_PROXY_BASE_URL";
pub const TIMEOUT_ENV: &str = "CLAUDE_PROXY_TIMEOUT_S";
pub const MANAGEMENT_KEY_ENV: &str = "CLAUDE_MANAGEMENT_KEY";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8317";
const DEFAULT_PROVIDER: &str = "claude";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Optional settings file, `~/.config/oauth-usage/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub provider: Option<String>,
}

impl FileConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oauth-usage")
            .join("config.toml")
    }

    /// Load `explicit`, or the default path when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Like [`FileConfig::load`], with the error chain folded onto one line.
    pub fn load_for_run(explicit: Option<&Path>) -> Result<Self, UsageError> {
        Self::load(explicit)
            .map_err(|e| UsageError::InvalidConfig(single_line(&format!("{:#}", e))))
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub provider: Option<String>,
    pub auth_indices: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
    pub pretty_body: bool,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub provider: String,
    pub auth_indices: Vec<String>,
    pub timeout: Duration,
    pub json: bool,
    pub pretty_body: bool,
    pub management_key: String,
}

impl Config {
    /// Merge CLI flags, environment and file settings, in that precedence.
    pub fn resolve<F>(cli: CliOverrides, env: F, file: FileConfig) -> Result<Self, UsageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());

        let management_key = env(MANAGEMENT_KEY_ENV).ok_or(UsageError::MissingCredential {
            var: MANAGEMENT_KEY_ENV,
        })?;

        let base_url = cli
            .base_url
            .or_else(|| env(BASE_URL_ENV))
            .or(file.proxy.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = match cli.timeout_secs {
            Some(secs) => secs,
            None => match env(TIMEOUT_ENV) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    UsageError::InvalidConfig(format!(
                        "{} must be whole seconds, got {:?}",
                        TIMEOUT_ENV, raw
                    ))
                })?,
                None => file.proxy.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
        };

        let provider = cli
            .provider
            .or(file.proxy.provider)
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            provider,
            auth_indices: cli.auth_indices,
            timeout: Duration::from_secs(timeout_secs),
            json: cli.json,
            pretty_body: cli.pretty_body,
            management_key,
        })
    }

    /// Headers sent to the management API itself.
    pub fn management_headers(&self) -> Result<HeaderMap, UsageError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.management_key))
            .map_err(|_| {
                UsageError::InvalidConfig(format!(
                    "{} contains characters not allowed in a header",
                    MANAGEMENT_KEY_ENV
                ))
            })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}
