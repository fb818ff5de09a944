//! Sandbox configuration.
//!
//! A `SandboxConfig` is resolved once per process from the ambient
//! environment (and an optional `cellbox` config file) and is immutable for
//! the lifetime of the sandbox instances it configures. Nothing in the
//! subsystem reads the environment after this point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Language tag assumed when a request does not name one.
pub const DEFAULT_LANGUAGE: &str = "python";

/// How a language tag maps onto an interpreter invocation.
///
/// The same argv runs the payload script locally and inside a container,
/// with the script path appended; the configured container image must carry
/// the interpreter.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LanguageSpec {
    /// Interpreter argv, e.g. `["python3"]` or `["node", "--no-warnings"]`.
    pub argv: Vec<String>,
    /// File extension for the payload script, without the dot.
    pub extension: String,
}

/// Top-level sandbox configuration.
///
/// Environment keys use the `CELLBOX` prefix with `__` as the section
/// separator, e.g. `CELLBOX__BACKEND=container`,
/// `CELLBOX__CONTAINER__MEMORY_LIMIT_MB=512`.
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Which backend to run payloads in: "local" or "container".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Per-call wall-clock ceiling when the request does not override it.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Per-stream truncation ceiling for captured stdout/stderr.
    #[serde(default = "default_max_output_kb")]
    pub max_output_kb: u64,

    /// Where per-call scratch directories are created (default: OS temp dir).
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Container backend settings.
    #[serde(default)]
    pub container: ContainerConfig,

    /// Language table; extended via the config file, not code.
    #[serde(default = "default_languages")]
    pub languages: HashMap<String, LanguageSpec>,
}

/// Settings specific to the container backend.
#[derive(Debug, Deserialize, Clone)]
pub struct ContainerConfig {
    /// Base image for payload containers.
    #[serde(default = "default_image")]
    pub image: String,

    /// Whether the container gets a network namespace with connectivity.
    #[serde(default)]
    pub network_enabled: bool,

    /// CPU ceiling in cores (0.5 = half a core).
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,

    /// Memory ceiling in megabytes; exceeding it gets the payload OOM-killed.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,

    /// Non-root user the payload runs as inside the container.
    #[serde(default = "default_container_user")]
    pub user: String,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_output_kb() -> u64 {
    10
}

fn default_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_cpu_limit() -> f64 {
    0.5
}

fn default_memory_limit_mb() -> u64 {
    256
}

fn default_container_user() -> String {
    "nobody".to_string()
}

fn default_languages() -> HashMap<String, LanguageSpec> {
    HashMap::from([(
        DEFAULT_LANGUAGE.to_string(),
        LanguageSpec {
            argv: vec!["python3".to_string()],
            extension: "py".to_string(),
        },
    )])
}

impl SandboxConfig {
    /// Resolve the configuration from an optional `cellbox` file plus
    /// `CELLBOX__*` environment variables.
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("cellbox").required(false))
            .add_source(
                Environment::with_prefix("CELLBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// The default per-call timeout as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// The per-stream output cap in bytes.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_kb as usize * 1024
    }

    /// Look up a language tag (case-insensitive) in the language table.
    pub fn language(&self, tag: &str) -> Result<LanguageSpec> {
        self.languages
            .get(&tag.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnsupportedLanguage(tag.to_string()))
    }
}

impl ContainerConfig {
    /// Memory ceiling in bytes, as the container runtime expects it.
    pub fn memory_limit_bytes(&self) -> i64 {
        self.memory_limit_mb as i64 * 1024 * 1024
    }

    /// Docker network mode string for this configuration.
    pub fn network_mode(&self) -> &'static str {
        if self.network_enabled {
            "bridge"
        } else {
            "none"
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_timeout_secs: default_timeout_secs(),
            max_output_kb: default_max_output_kb(),
            scratch_root: None,
            container: ContainerConfig::default(),
            languages: default_languages(),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            network_enabled: false,
            cpu_limit: default_cpu_limit(),
            memory_limit_mb: default_memory_limit_mb(),
            user: default_container_user(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = SandboxConfig::default();
        assert_eq!(config.backend, "local");
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_output_bytes(), 10 * 1024);
        assert!(config.scratch_root.is_none());
        assert_eq!(config.container.image, "python:3.11-slim");
        assert!(!config.container.network_enabled);
        assert_eq!(config.container.network_mode(), "none");
        assert_eq!(config.container.memory_limit_bytes(), 256 * 1024 * 1024);
        assert_eq!(config.container.user, "nobody");
    }

    #[test]
    fn sparse_sources_fall_back_to_defaults() {
        // The env/file sources usually supply only a few keys; everything
        // else must come from the serde defaults.
        let config: SandboxConfig =
            serde_json::from_str(r#"{"backend": "container"}"#).unwrap();
        assert_eq!(config.backend, "container");
        assert_eq!(config.default_timeout_secs, 30);
        assert!(config.languages.contains_key(DEFAULT_LANGUAGE));
    }

    #[test]
    fn language_lookup_is_case_insensitive() {
        let config = SandboxConfig::default();
        let spec = config.language("Python").unwrap();
        assert_eq!(spec.argv, vec!["python3".to_string()]);
        assert_eq!(spec.extension, "py");
    }

    #[test]
    fn unknown_language_is_rejected() {
        let config = SandboxConfig::default();
        let err = config.language("cobol").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[test]
    fn network_mode_follows_flag() {
        let mut container = ContainerConfig::default();
        container.network_enabled = true;
        assert_eq!(container.network_mode(), "bridge");
    }
}
