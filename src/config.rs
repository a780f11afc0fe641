//! Configuration parsing and validation for ideastream.
//!
//! Every setting has a default, so the server can start from the
//! environment alone. A TOML file may override any of them.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::provider::{Prompt, PromptError, PromptMessage};

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the JWKS URL.
pub const JWKS_URL_ENV: &str = "CLERK_JWKS_URL";

/// Key set used when no JWKS URL is configured.
pub const DEFAULT_JWKS_URL: &str = "https://clerk.com/.well-known/jwks.json";

/// Prompt sent when none is configured.
pub const DEFAULT_PROMPT: &str = "Reply with a new business idea for AI Agents, formatted with headings, sub-headings and bullet points";

/// Root configuration structure, fully resolved.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    pub prompt: Prompt,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path of the streaming endpoint
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_route() -> String {
    "/api".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            route: default_route(),
        }
    }
}

/// Bearer token verification settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwks_url: String,
    pub jwks_source: KeySource,
    /// Accepted `iss` values; unchecked when `None`.
    pub issuer: Option<String>,
    /// Accepted `aud` values; unchecked when empty.
    pub audience: Vec<String>,
    /// Clock skew tolerance for `exp` and `nbf`.
    pub leeway_secs: u64,
}

/// Completion provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: ApiKey,
    pub key_source: KeySource,
    pub model: String,
    pub connect_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Where a resolved setting came from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Literal string in the config file
    Literal,
    /// Config value with `${VAR}` references expanded from the environment
    EnvExpanded,
    /// Read from a well-known environment variable (holds the var name)
    Environment(String),
    /// Built-in default
    Default,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Environment(var) => write!(f, "environment ({})", var),
            KeySource::Default => write!(f, "default"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },

    #[error("No provider API key: set provider.api_key or the {var} environment variable")]
    MissingApiKey { var: String },

    #[error("Invalid prompt: {0}")]
    Prompt(#[from] PromptError),
}

/// Raw configuration deserialized directly from TOML.
/// String values may contain `${VAR}` references not yet expanded.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    auth: RawAuthConfig,
    #[serde(default)]
    provider: RawProviderConfig,
    #[serde(default)]
    prompt: RawPromptConfig,
}

#[derive(Debug, Deserialize)]
struct RawAuthConfig {
    jwks_url: Option<String>,
    issuer: Option<String>,
    #[serde(default)]
    audience: Vec<String>,
    #[serde(default = "default_leeway_secs")]
    leeway_secs: u64,
}

fn default_leeway_secs() -> u64 {
    60
}

impl Default for RawAuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: Vec::new(),
            leeway_secs: default_leeway_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProviderConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    api_key: Option<String>,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-5-nano".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for RawProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPromptConfig {
    #[serde(default = "default_prompt_messages")]
    messages: Vec<PromptMessage>,
}

fn default_prompt_messages() -> Vec<PromptMessage> {
    vec![PromptMessage::new("user", DEFAULT_PROMPT)]
}

impl Default for RawPromptConfig {
    fn default() -> Self {
        Self {
            messages: default_prompt_messages(),
        }
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports several references in one string (e.g. `${SCHEME}://${HOST}/v1`).
/// Fails on the first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve a config value: file value (expanded) first, then a well-known
/// environment variable. `None` when neither is present.
fn resolve_with<F>(
    configured: Option<&str>,
    field: &str,
    env_var: &str,
    lookup: &F,
) -> Result<Option<(String, KeySource)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match configured {
        Some(raw) if raw.contains("${") => {
            let expanded = expand_env_vars_with(raw, field, lookup)?;
            Ok(Some((expanded, KeySource::EnvExpanded)))
        }
        Some(raw) => Ok(Some((raw.to_string(), KeySource::Literal))),
        None => Ok(lookup(env_var)
            .filter(|v| !v.trim().is_empty())
            .map(|v| (v, KeySource::Environment(env_var.to_string())))),
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Convert raw config to the final config using a custom variable lookup.
    ///
    /// The closure makes resolution testable without touching global env state.
    pub fn from_raw_with<F>(raw: RawConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (jwks_url, jwks_source) = resolve_with(
            raw.auth.jwks_url.as_deref(),
            "auth.jwks_url",
            JWKS_URL_ENV,
            &lookup,
        )?
        .unwrap_or_else(|| (DEFAULT_JWKS_URL.to_string(), KeySource::Default));

        let (api_key, key_source) = resolve_with(
            raw.provider.api_key.as_deref(),
            "provider.api_key",
            API_KEY_ENV,
            &lookup,
        )?
        .ok_or_else(|| ConfigError::MissingApiKey {
            var: API_KEY_ENV.to_string(),
        })?;

        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey {
                var: API_KEY_ENV.to_string(),
            });
        }

        let config = Config {
            server: raw.server,
            auth: AuthConfig {
                jwks_url,
                jwks_source,
                issuer: raw.auth.issuer,
                audience: raw.auth.audience,
                leeway_secs: raw.auth.leeway_secs,
            },
            provider: ProviderConfig {
                base_url: raw.provider.base_url,
                api_key: ApiKey::from(api_key),
                key_source,
                model: raw.provider.model,
                connect_timeout_secs: raw.provider.connect_timeout_secs,
            },
            prompt: Prompt::new(raw.prompt.messages)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Convert raw config to the final config using the process environment.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Self::from_raw_with(raw, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string, resolving against the process environment.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Build configuration from defaults and the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::default())
    }

    /// Load from `path` when given, otherwise from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid listen address '{}': {}",
                self.server.listen, e
            ))
        })
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if !self.server.route.starts_with('/') || self.server.route == "/health" {
            return Err(ConfigError::Validation(format!(
                "Route '{}' must start with '/' and must not be '/health'",
                self.server.route
            )));
        }

        if !is_http_url(&self.auth.jwks_url) {
            return Err(ConfigError::Validation(format!(
                "JWKS URL '{}' is not an http(s) URL",
                self.auth.jwks_url
            )));
        }

        if !is_http_url(&self.provider.base_url) {
            return Err(ConfigError::Validation(format!(
                "Provider base URL '{}' is not an http(s) URL",
                self.provider.base_url
            )));
        }

        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Provider model must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
