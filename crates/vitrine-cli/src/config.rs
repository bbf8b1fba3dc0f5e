//! Configuration for the Vitrine CLI.
//!
//! Provides the [`VitrineConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `VITRINE_CONFIG` environment variable
//! 3. XDG default: `~/.config/vitrine/config.toml`
//! 4. Built-in defaults
//!
//! `VITRINE_<SECTION>_<KEY>` variables overlay the file, e.g.
//! `VITRINE_CONTENT_READ_TOKEN` or `VITRINE_PREVIEW_SECRET`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};

use vitrine_content::ClientConfig;
use vitrine_core::preview::DEFAULT_COOKIE_NAME;
use vitrine_core::{Error, PreviewSecret, PreviewVerifier, Result};
use vitrine_live::LiveConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VITRINE";

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "VITRINE_CONFIG";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitrineConfig {
    /// Content store connection.
    pub content: ClientConfig,

    /// Editor preview cookie.
    pub preview: PreviewConfig,

    /// Live subscription reconnect policy.
    pub live: LiveSettings,
}

/// Editor preview cookie settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Secret the cookie MAC key is derived from. Never serialized back out.
    #[serde(skip_serializing)]
    pub secret: Option<String>,

    /// Cookie name.
    pub cookie_name: String,

    /// Cookie lifetime in seconds.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub max_age_secs: u64,
}

/// Reconnect policy for live subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Reconnect attempts before a subscription reports failure.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay, in milliseconds.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub initial_delay_ms: u64,

    /// Reconnect delay ceiling, in milliseconds.
    #[serde(deserialize_with = "vitrine_core::env_value::parse")]
    pub max_delay_ms: u64,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            max_age_secs: 60 * 60,
        }
    }
}

impl fmt::Debug for PreviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("cookie_name", &self.cookie_name)
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        let live = LiveConfig::default();
        Self {
            max_reconnect_attempts: live.max_reconnect_attempts,
            initial_delay_ms: live.initial_delay.as_millis() as u64,
            max_delay_ms: live.max_delay.as_millis() as u64,
        }
    }
}

impl LiveSettings {
    /// The policy handed to the live query store.
    pub fn to_live_config(&self) -> LiveConfig {
        LiveConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl VitrineConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level(ENV_PREFIX);
        env_opts.add_section("content");
        env_opts.add_section("preview");
        env_opts.add_section("live");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        let from_env = std::env::var(CONFIG_ENV_VAR).ok();
        Self::resolve_config_path_with(explicit, from_env.as_deref())
    }

    /// [`VitrineConfig::resolve_config_path`] with the env var value passed in.
    pub fn resolve_config_path_with(
        explicit: Option<&str>,
        from_env: Option<&str>,
    ) -> Option<PathBuf> {
        explicit
            .or(from_env)
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vitrine").join("config.toml"))
    }

    /// Builds the preview cookie verifier.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when no secret is configured.
    pub fn preview_verifier(&self) -> Result<PreviewVerifier> {
        let secret = self
            .preview
            .secret
            .as_deref()
            .ok_or_else(|| Error::config("preview.secret is not set"))?;
        let max_age = i64::try_from(self.preview.max_age_secs)
            .map_err(|_| Error::config("preview.max_age_secs is out of range"))?;
        Ok(PreviewVerifier::new(
            PreviewSecret::new(secret)?,
            self.preview.cookie_name.clone(),
            chrono::Duration::seconds(max_age),
        ))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into environment variable pairs with `VITRINE_` prefix.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value: toml::Value =
            toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, ENV_PREFIX, &mut vars);
        Ok(vars)
    }
}

// ============================================================================
// Helper: flatten TOML to env vars
// ============================================================================

/// Recursively flatten a TOML value into `KEY=value` pairs.
fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let env_key = format!("{}_{}", prefix, key.to_uppercase());
                flatten_toml_value(val, &env_key, out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
