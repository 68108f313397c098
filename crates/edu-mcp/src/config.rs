//! Settings
//!
//! Layered with the `config` crate, later sources winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config <path>`, else `config/edu-mcp.toml` if present)
//! 3. environment variables `EDU_MCP__<SECTION>__<KEY>`, e.g.
//!    `EDU_MCP__SERVER__PORT=9000` or `EDU_MCP__BACKEND__TIMEOUT_SECS=60`
//!
//! Command-line flags are applied on top by the binary.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// File looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "config/edu-mcp";
pub const ENV_PREFIX: &str = "EDU_MCP";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub backend: BackendSettings,
    pub tunnel: TunnelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Name reported in `initialize`
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: crate::SERVER_NAME.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `/chat/completions` base URL; falls back to `OPENAI_BASE_URL`
    pub base_url: Option<String>,
    pub model: String,
    /// Falls back to `OPENAI_API_KEY`
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Per-HTTP-request timeout; unset means none
    pub request_timeout_secs: Option<u64>,
    pub num_questions: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: Some(0.7),
            max_tokens: None,
            request_timeout_secs: None,
            num_questions: 5,
        }
    }
}

impl LlmSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Deadline for a whole generation call; unset means wait indefinitely
    pub timeout_secs: Option<u64>,
}

impl BackendSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    pub enabled: bool,
    /// ngrok agent API
    pub api_url: String,
    /// Start `ngrok start --none` instead of using a running agent
    pub spawn_agent: bool,
    pub ngrok_path: String,
    /// Passed to a spawned agent as `NGROK_AUTHTOKEN`
    pub authtoken: Option<String>,
    pub agent_start_timeout_secs: u64,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "http://127.0.0.1:4040".to_string(),
            spawn_agent: false,
            ngrok_path: "ngrok".to_string(),
            authtoken: None,
            agent_start_timeout_secs: 10,
        }
    }
}

impl TunnelSettings {
    pub fn agent_start_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_start_timeout_secs)
    }
}

impl Settings {
    /// Load from `path` (required if given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`Settings::load`] with an explicit environment map
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}
