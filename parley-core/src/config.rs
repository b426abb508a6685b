use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::ParleyError;

/// Default OpenRouter-compatible endpoint root.
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default chat model requested from the gateway.
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash-lite-preview-09-2025";

#[derive(Debug, Deserialize, Clone)]
pub struct ParleyConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub keepalive: KeepAliveConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/parley".to_string(),
            max_connections: 5,
            connect_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bearer credential for the chat-completion API. Absent (or empty) is a
    /// configuration error reported per request, not at startup.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            model: DEFAULT_GATEWAY_MODEL.to_string(),
            timeout_seconds: 60,
        }
    }
}

impl GatewayConfig {
    /// The credential, with empty strings treated as missing.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    /// Externally reachable base URL of this process. Falls back to localhost.
    pub external_url: Option<String>,
    pub initial_delay_seconds: u64,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            external_url: None,
            initial_delay_seconds: 5 * 60,
            interval_seconds: 14 * 60,
            timeout_seconds: 30,
        }
    }
}

impl KeepAliveConfig {
    /// Base URL the pinger should target, given the port the server listens on.
    pub fn target_base_url(&self, port: u16) -> String {
        match self.external_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", port),
        }
    }
}

/// Conventional deployment variables and the config keys they override.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "http.port"),
    ("DATABASE_URL", "database.url"),
    ("OPENROUTER_API_KEY", "gateway.api_key"),
    ("RENDER_EXTERNAL_URL", "keepalive.external_url"),
    ("EXTERNAL_URL", "keepalive.external_url"),
];

impl ParleyConfig {
    /// Load from an optional TOML file, `PARLEY__*` variables and the
    /// conventional deployment variables (highest precedence).
    pub fn load(path: &str) -> Result<Self, ParleyError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PARLEY")
                    .prefix_separator("__")
                    .separator("__"),
            );

        // Later entries win, so EXTERNAL_URL beats RENDER_EXTERNAL_URL.
        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    builder = builder.set_override(*key, value)?;
                }
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Parse a TOML document on its own, without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ParleyError> {
        Ok(Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }
}
