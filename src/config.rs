//! Runtime configuration for ollama-gateway.
//!
//! Every knob is a CLI flag with an environment-variable twin. The parsed
//! [`Cli`] is resolved exactly once into an immutable [`Config`], which is then
//! shared (`Arc<Config>`) with the backend client and the router.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::auth::AuthPolicy;

/// Default address of the local Ollama server.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("authentication policy must be chosen explicitly: set GATEWAY_API_TOKEN or AUTH_MODE=disabled")]
    AuthPolicyUnset,

    #[error("AUTH_MODE=bearer requires GATEWAY_API_TOKEN")]
    MissingApiToken,

    #[error("invalid OLLAMA_BASE_URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Which of the two gateway variants to behave like.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Lean deployment: terse health, errors embedded in 200 bodies.
    Minimal,
    /// Full platform: backend probe in health, status-coded errors.
    Enhanced,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Minimal => "Enhanced Dimensional AI Platform",
            Profile::Enhanced => "AI Behar Platform",
        }
    }

    /// Short platform label reported by `/api/info`.
    pub fn platform(&self) -> &'static str {
        match self {
            Profile::Minimal => "Enhanced Dimensional AI",
            Profile::Enhanced => "AI Behar",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Profile::Minimal => "2.0.0",
            Profile::Enhanced => "1.0.0",
        }
    }

    fn default_environment(&self) -> &'static str {
        match self {
            Profile::Minimal => "production",
            Profile::Enhanced => "development",
        }
    }

    fn default_error_style(&self) -> ErrorStyle {
        match self {
            Profile::Minimal => ErrorStyle::Embedded,
            Profile::Enhanced => ErrorStyle::Status,
        }
    }

    fn default_counter_scope(&self) -> CounterScope {
        match self {
            Profile::Minimal => CounterScope::AllRequests,
            Profile::Enhanced => CounterScope::HealthOnly,
        }
    }

    fn default_models_timeout(&self) -> Duration {
        match self {
            Profile::Minimal => Duration::from_secs(30),
            Profile::Enhanced => Duration::from_secs(10),
        }
    }
}

/// How backend failures are reported to callers.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStyle {
    /// Non-2xx HTTP status with an `{"error": ...}` body.
    Status,
    /// HTTP 200 with an `{"error": ...}` body.
    Embedded,
}

/// Which inbound requests bump `api_requests_total`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterScope {
    AllRequests,
    HealthOnly,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Disabled,
    Bearer,
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "ollama-gateway", about = "HTTP gateway in front of a local Ollama server")]
pub struct Cli {
    /// Gateway variant to emulate.
    #[arg(long, env = "GATEWAY_PROFILE", value_enum, default_value = "enhanced")]
    pub profile: Profile,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Ollama base URL.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_OLLAMA_BASE_URL)]
    pub ollama_base_url: String,

    /// Comma-separated CORS allow-list; `*` allows any origin.
    #[arg(long, env = "CORS_ALLOW_ORIGIN", default_value = "*")]
    pub cors_allow_origin: String,

    /// Deployment label reported by `/health` and `/`.
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,

    /// Enable debug logging.
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", value_parser = BoolishValueParser::new())]
    pub log_json: bool,

    /// Error convention; defaults per profile.
    #[arg(long, env = "ERROR_STYLE", value_enum)]
    pub error_style: Option<ErrorStyle>,

    /// Request counter scope; defaults per profile.
    #[arg(long, env = "COUNTER_SCOPE", value_enum)]
    pub counter_scope: Option<CounterScope>,

    /// Authentication mode for `POST /api/chat`.
    #[arg(long = "auth", env = "AUTH_MODE", value_enum)]
    pub auth_mode: Option<AuthMode>,

    /// Bearer token accepted by `POST /api/chat`.
    #[arg(long, env = "GATEWAY_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Timeout for model listing calls, in seconds; defaults per profile.
    #[arg(long, env = "MODELS_TIMEOUT_SECS")]
    pub models_timeout_secs: Option<u64>,
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Profile,

    /// Server configuration.
    pub server: ServerConfig,

    /// Backend client configuration.
    pub backend: BackendConfig,

    pub cors: CorsConfig,

    /// Deployment label.
    pub environment: String,

    pub debug: bool,

    pub error_style: ErrorStyle,

    pub counter_scope: CounterScope,

    pub auth: AuthPolicy,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Ollama endpoint and per-call timeouts.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL without trailing slash.
    pub base_url: String,

    /// Timeout for the `/health` probe.
    pub health_timeout: Duration,

    /// Timeout for `/api/models` listing.
    pub models_timeout: Duration,

    /// Timeout for chat calls; for streams this bounds connection setup and
    /// each idle gap between chunks.
    pub chat_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            health_timeout: Duration::from_secs(5),
            models_timeout: Duration::from_secs(10),
            chat_timeout: Duration::from_secs(60),
        }
    }
}

/// CORS allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfig {
    AllowAll,
    AllowList(Vec<String>),
}

impl CorsConfig {
    /// Parse a comma-separated origin list. Any `*` entry allows everything.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsConfig::AllowAll
        } else {
            CorsConfig::AllowList(origins)
        }
    }
}

impl Config {
    /// Profile defaults with authentication disabled.
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            profile,
            server: ServerConfig::default(),
            backend: BackendConfig {
                models_timeout: profile.default_models_timeout(),
                ..BackendConfig::default()
            },
            cors: CorsConfig::AllowAll,
            environment: profile.default_environment().to_string(),
            debug: false,
            error_style: profile.default_error_style(),
            counter_scope: profile.default_counter_scope(),
            auth: AuthPolicy::Disabled,
        }
    }

    /// Resolve parsed CLI arguments into a configuration.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let defaults = Self::for_profile(cli.profile);

        let base_url = normalize_base_url(&cli.ollama_base_url)?;
        let auth = resolve_auth(cli.auth_mode, cli.api_token.as_deref())?;

        Ok(Self {
            server: ServerConfig {
                host: cli.host.clone(),
                port: cli.port,
            },
            backend: BackendConfig {
                base_url,
                models_timeout: cli
                    .models_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.backend.models_timeout),
                ..defaults.backend
            },
            cors: CorsConfig::parse(&cli.cors_allow_origin),
            environment: cli.environment.clone().unwrap_or(defaults.environment),
            debug: cli.debug,
            error_style: cli.error_style.unwrap_or(defaults.error_style),
            counter_scope: cli.counter_scope.unwrap_or(defaults.counter_scope),
            auth,
            profile: cli.profile,
        })
    }

    /// Socket address string to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    Ok(trimmed.to_string())
}

fn resolve_auth(mode: Option<AuthMode>, token: Option<&str>) -> Result<AuthPolicy, ConfigError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty());

    match (mode, token) {
        (Some(AuthMode::Disabled), _) => Ok(AuthPolicy::Disabled),
        (Some(AuthMode::Bearer) | None, Some(token)) => Ok(AuthPolicy::bearer(token)),
        (Some(AuthMode::Bearer), None) => Err(ConfigError::MissingApiToken),
        (None, None) => Err(ConfigError::AuthPolicyUnset),
    }
}
