pub mod embed;
pub mod error;
pub mod forward;
pub mod handlers;
pub mod logging;
pub mod signature;
pub mod webhook;

use axum::{Router, routing};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::error::{RelayError, Result};
use crate::logging::LogRotation;
use crate::signature::TravisPublicKey;

pub const DEFAULT_TRAVIS_CONFIG_URL: &str = "https://api.travis-ci.org/config";
const DEFAULT_KEY_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_LOG_FILES: usize = 5;
/// Discord embed colors are 24-bit RGB values.
const MAX_EMBED_COLOR: u32 = 0xFF_FF_FF;

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub discord_webhook: Url,
    pub authorized_owners: HashSet<String>,
    pub colors: HashMap<String, u32>,
    pub default_color: Option<u32>,
    #[serde(default)]
    pub branch_style: BranchStyle,
    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the branch field of an embed is rendered.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BranchStyle {
    /// Inline code linking to the branch tree on GitHub.
    #[default]
    Link,
    /// Inline code only.
    Code,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignatureConfig {
    #[serde(default = "default_signature_enabled")]
    pub enabled: bool,
    #[serde(default = "default_travis_config_url")]
    pub travis_config_url: String,
    #[serde(default = "default_key_fetch_timeout_secs")]
    pub key_fetch_timeout_secs: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            enabled: default_signature_enabled(),
            travis_config_url: default_travis_config_url(),
            key_fetch_timeout_secs: default_key_fetch_timeout_secs(),
        }
    }
}

fn default_signature_enabled() -> bool {
    true
}

fn default_travis_config_url() -> String {
    DEFAULT_TRAVIS_CONFIG_URL.to_string()
}

fn default_key_fetch_timeout_secs() -> u64 {
    DEFAULT_KEY_FETCH_TIMEOUT_SECS
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            rotation: LogRotation::default(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_max_log_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}

impl RelayConfig {
    /// Parses, normalises and validates a TOML configuration document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let mut config: RelayConfig = toml::from_str(toml_str)?;
        // Status keywords are matched lowercase.
        config.colors = config
            .colors
            .into_iter()
            .map(|(status, color)| (status.to_lowercase(), color))
            .collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.discord_webhook.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RelayError::ConfigError(format!(
                    "discord_webhook must be an http(s) URL, got scheme '{}'",
                    other
                )));
            }
        }

        if self.authorized_owners.is_empty() {
            return Err(RelayError::ConfigError(
                "authorized_owners is empty; no notification could ever be relayed".to_string(),
            ));
        }

        let colors = self
            .colors
            .iter()
            .map(|(status, color)| (status.as_str(), *color))
            .chain(self.default_color.map(|color| ("default_color", color)));
        for (name, color) in colors {
            if color > MAX_EMBED_COLOR {
                return Err(RelayError::ConfigError(format!(
                    "Color for '{}' ({}) is larger than 0xFFFFFF",
                    name, color
                )));
            }
        }

        if self.signature.enabled {
            Url::parse(&self.signature.travis_config_url).map_err(|e| {
                RelayError::ConfigError(format!(
                    "Invalid signature.travis_config_url '{}': {}",
                    self.signature.travis_config_url, e
                ))
            })?;
        }

        Ok(())
    }

    /// Returns true if notifications from this repository owner are accepted.
    pub fn is_authorized(&self, owner: &str) -> bool {
        self.authorized_owners.contains(owner)
    }
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<RelayConfig> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        RelayError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    RelayConfig::from_toml_str(&config_str).map_err(|e| {
        RelayError::ConfigError(format!(
            "Failed to load config file '{}': {}",
            path.display(),
            e
        ))
    })
}

pub struct AppState {
    pub config: RelayConfig,
    /// Present exactly when signature verification is enabled.
    pub public_key: Option<TravisPublicKey>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        public_key: Option<TravisPublicKey>,
        http: reqwest::Client,
    ) -> Result<Self> {
        if config.signature.enabled && public_key.is_none() {
            return Err(RelayError::ConfigError(
                "Signature verification is enabled but no Travis public key was loaded"
                    .to_string(),
            ));
        }
        Ok(Self {
            config,
            public_key,
            http,
        })
    }
}

pub type SharedState = Arc<AppState>;

/// Routes served by the relay.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(handlers::root))
        .route("/notify", routing::post(handlers::handle_notification))
        .route("/webhook", routing::post(handlers::handle_notification))
        .with_state(state)
}
