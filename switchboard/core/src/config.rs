//! Configuration
//!
//! Configuration is assembled in layers, later layers winning:
//!
//! 1. Built-in defaults (a single local Ollama engine)
//! 2. A TOML file (`--config`, or `$XDG_CONFIG_HOME/switchboard/config.toml`
//!    when it exists)
//! 3. Environment variables (see [`SwitchboardConfig::apply_env`])
//! 4. Explicit [`ConfigOverrides`] (command-line flags)
//!
//! ```toml
//! [router]
//! active = "ollama"
//! fallback = "openai"
//!
//! [timeouts]
//! generate_secs = 60
//! health_secs = 5
//!
//! [engines.ollama]
//! host = "localhost"
//! port = 11434
//! model = "llama3"
//! required_model = "llama3"
//!
//! [engines.openai]
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Values parsed but are not usable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the effective configuration came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file
    File(PathBuf),
    /// No file found; built-in defaults
    Defaults,
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Initial routing
    pub router: RouterSection,
    /// Network timeouts
    pub timeouts: TimeoutConfig,
    /// Control surface bind address
    pub server: ServerConfig,
    /// Engine definitions
    pub engines: EnginesConfig,
}

/// Initial active/fallback selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Engine to make active after registration
    pub active: Option<String>,
    /// Engine to fall back to (validated lazily)
    pub fallback: Option<String>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            active: Some("ollama".to_string()),
            fallback: None,
        }
    }
}

/// Timeouts for engine calls
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for one `generate` call
    pub generate_secs: u64,
    /// Upper bound for one health probe
    pub health_secs: u64,
    /// Reuse a health result for this long (0 = always probe)
    pub health_cache_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generate_secs: 60,
            health_secs: 5,
            health_cache_ms: 0,
        }
    }
}

impl TimeoutConfig {
    /// Generation timeout
    #[must_use]
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_secs)
    }

    /// Health probe timeout
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }

    /// Health cache TTL, if enabled
    #[must_use]
    pub fn health_cache_ttl(&self) -> Option<Duration> {
        (self.health_cache_ms > 0).then(|| Duration::from_millis(self.health_cache_ms))
    }
}

/// HTTP control surface settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// All engine sections; `None` means the engine is not configured
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Local Ollama server
    pub ollama: Option<OllamaConfig>,
    /// OpenAI chat completions
    pub openai: Option<OpenAiConfig>,
    /// Google Gemini
    pub gemini: Option<GeminiConfig>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            ollama: Some(OllamaConfig::default()),
            openai: None,
            gemini: None,
        }
    }
}

/// Local Ollama engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Register this engine
    pub enabled: bool,
    /// Ollama host address
    pub host: String,
    /// Ollama port number
    pub port: u16,
    /// Model used for generation
    pub model: String,
    /// Health additionally requires this model to be listed by the server
    pub required_model: Option<String>,
    /// Ask Ollama to unload the model when the engine shuts down
    pub unload_on_shutdown: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3".to_string(),
            required_model: None,
            unload_on_shutdown: false,
        }
    }
}

/// OpenAI engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Register this engine
    pub enabled: bool,
    /// Chat model
    pub model: String,
    /// API base URL (without `/v1`)
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

impl OpenAiConfig {
    /// Inline key, else the named environment variable; empty counts as unset
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Google Gemini engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Register this engine
    pub enabled: bool,
    /// Model name
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Inline API key; takes precedence over `api_key_env`
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

impl GeminiConfig {
    /// Inline key, else the named environment variable; empty counts as unset
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

fn resolve_key(inline: Option<&str>, env_var: &str) -> Option<String> {
    inline
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Explicit overrides, typically from command-line flags
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Active engine
    pub active: Option<String>,
    /// Fallback engine
    pub fallback: Option<String>,
    /// Bind host
    pub host: Option<String>,
    /// Bind port
    pub port: Option<u16>,
}

impl SwitchboardConfig {
    /// Parse from a TOML string
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables:
    /// - `SWITCHBOARD_ACTIVE_ENGINE`, `SWITCHBOARD_FALLBACK_ENGINE`: routing
    /// - `SWITCHBOARD_HOST`, `SWITCHBOARD_PORT`: control surface bind address
    /// - `OLLAMA_HOST`, `OLLAMA_PORT`, `OLLAMA_MODEL`: local engine
    /// - `OPENAI_MODEL`, `GEMINI_MODEL`: cloud models
    /// - `OPENAI_API_KEY`, `GEMINI_API_KEY`: enable the cloud engine with
    ///   defaults when its section is missing
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(active) = get("SWITCHBOARD_ACTIVE_ENGINE") {
            self.router.active = Some(active);
        }
        if let Some(fallback) = get("SWITCHBOARD_FALLBACK_ENGINE") {
            self.router.fallback = Some(fallback);
        }
        if let Some(host) = get("SWITCHBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("SWITCHBOARD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Some(ollama) = self.engines.ollama.as_mut() {
            if let Some(host) = get("OLLAMA_HOST") {
                ollama.host = host;
            }
            if let Some(port) = get("OLLAMA_PORT").and_then(|p| p.parse().ok()) {
                ollama.port = port;
            }
            if let Some(model) = get("OLLAMA_MODEL") {
                ollama.model = model;
            }
        }

        if self.engines.openai.is_none() && get("OPENAI_API_KEY").is_some() {
            self.engines.openai = Some(OpenAiConfig::default());
        }
        if let Some(openai) = self.engines.openai.as_mut() {
            if let Some(model) = get("OPENAI_MODEL") {
                openai.model = model;
            }
        }

        if self.engines.gemini.is_none() && get("GEMINI_API_KEY").is_some() {
            self.engines.gemini = Some(GeminiConfig::default());
        }
        if let Some(gemini) = self.engines.gemini.as_mut() {
            if let Some(model) = get("GEMINI_MODEL") {
                gemini.model = model;
            }
        }
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(active) = &overrides.active {
            self.router.active = Some(active.clone());
        }
        if let Some(fallback) = &overrides.fallback {
            self.router.fallback = Some(fallback.clone());
        }
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.generate_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.generate_secs must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.health_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.health_secs must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.health_secs > self.timeouts.generate_secs {
            return Err(ConfigError::Invalid(format!(
                "timeouts.health_secs ({}) must not exceed timeouts.generate_secs ({})",
                self.timeouts.health_secs, self.timeouts.generate_secs
            )));
        }
        if let Some(ollama) = &self.engines.ollama {
            if ollama.enabled && ollama.model.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "engines.ollama.model must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Default config file location
///
/// `$XDG_CONFIG_HOME/switchboard/config.toml` (or the platform equivalent).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("switchboard").join("config.toml"))
}

/// Load and validate a config file, without env overrides
pub fn load_config_from_path(path: &Path) -> Result<SwitchboardConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = SwitchboardConfig::from_toml(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the effective configuration
///
/// An explicit `path` must exist. Without one, the default path is used if
/// present, otherwise built-in defaults. Environment variables and
/// `overrides` are applied on top and the result is validated.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<(SwitchboardConfig, ConfigSource), ConfigError> {
    let (mut config, source) = match path {
        Some(path) => (load_config_from_path(path)?, ConfigSource::File(path.to_path_buf())),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(default) => (load_config_from_path(&default)?, ConfigSource::File(default)),
            None => (SwitchboardConfig::default(), ConfigSource::Defaults),
        },
    };

    config.apply_env();
    config.apply_overrides(overrides);
    config.validate()?;

    tracing::debug!(source = ?source, "Configuration loaded");
    Ok((config, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.router.active.as_deref(), Some("ollama"));
        assert_eq!(config.router.fallback, None);
        assert_eq!(config.timeouts.generate_timeout(), Duration::from_secs(60));
        assert_eq!(config.timeouts.health_timeout(), Duration::from_secs(5));
        assert_eq!(config.timeouts.health_cache_ttl(), None);
        assert!(config.engines.ollama.is_some());
        assert!(config.engines.openai.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            [router]
            active = "ollama"
            fallback = "openai"

            [timeouts]
            generate_secs = 30
            health_secs = 2
            health_cache_ms = 1500

            [engines.ollama]
            host = "gpu-box"
            port = 11500
            model = "mistral"
            required_model = "mistral:7b"

            [engines.openai]
            model = "gpt-4o"
            api_key = "sk-inline"
        "#;

        let config = SwitchboardConfig::from_toml(toml).unwrap();
        assert_eq!(config.router.fallback.as_deref(), Some("openai"));
        assert_eq!(config.timeouts.health_cache_ttl(), Some(Duration::from_millis(1500)));

        let ollama = config.engines.ollama.as_ref().unwrap();
        assert_eq!(ollama.host, "gpu-box");
        assert_eq!(ollama.port, 11500);
        assert_eq!(ollama.required_model.as_deref(), Some("mistral:7b"));
        assert!(ollama.enabled);

        let openai = config.engines.openai.as_ref().unwrap();
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.base_url, "https://api.openai.com");
        assert_eq!(openai.resolve_api_key().as_deref(), Some("sk-inline"));
        assert!(config.engines.gemini.is_none());
    }

    #[test]
    fn test_local_engine_stays_unless_disabled() {
        let config = SwitchboardConfig::from_toml("[engines.gemini]\nmodel = \"gemini-pro\"\n")
            .unwrap();
        assert!(config.engines.ollama.is_some());
        assert_eq!(config.engines.gemini.unwrap().model, "gemini-pro");

        let config = SwitchboardConfig::from_toml("[engines.ollama]\nenabled = false\n").unwrap();
        assert!(!config.engines.ollama.unwrap().enabled);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SWITCHBOARD_ACTIVE_ENGINE", "openai"),
            ("SWITCHBOARD_FALLBACK_ENGINE", "ollama"),
            ("SWITCHBOARD_PORT", "9090"),
            ("OLLAMA_HOST", "10.0.0.5"),
            ("OLLAMA_PORT", "not-a-port"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4.1"),
        ]
        .into_iter()
        .collect();

        let mut config = SwitchboardConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.router.active.as_deref(), Some("openai"));
        assert_eq!(config.router.fallback.as_deref(), Some("ollama"));
        assert_eq!(config.server.port, 9090);
        let ollama = config.engines.ollama.as_ref().unwrap();
        assert_eq!(ollama.host, "10.0.0.5");
        assert_eq!(ollama.port, 11434);
        assert_eq!(config.engines.openai.as_ref().unwrap().model, "gpt-4.1");
        assert!(config.engines.gemini.is_none());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = SwitchboardConfig::default();
        config.apply_overrides(&ConfigOverrides {
            active: Some("gemini".to_string()),
            fallback: None,
            host: Some("0.0.0.0".to_string()),
            port: Some(1234),
        });
        assert_eq!(config.router.active.as_deref(), Some("gemini"));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 1234);
    }

    #[test]
    fn test_validation() {
        let mut config = SwitchboardConfig::default();
        config.timeouts.health_secs = 120;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SwitchboardConfig::default();
        config.timeouts.generate_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router]\nactive = \"ollama\"\nfallback = \"gemini\"").unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.router.fallback.as_deref(), Some("gemini"));

        let (_, source) = load_config(Some(file.path()), &ConfigOverrides::default()).unwrap();
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_load_errors() {
        let missing = Path::new("/nonexistent/switchboard.toml");
        assert!(matches!(
            load_config_from_path(missing),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\ngenerate_secs = \"soon\"").unwrap();
        assert!(matches!(
            load_config_from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
