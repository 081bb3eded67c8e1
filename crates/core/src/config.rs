use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cap on the backoff between two gateway send attempts.
pub const GATEWAY_MAX_BACKOFF_SECS: u64 = 5;
/// HEAD probe of a freshly generated image URL.
pub const IMAGE_PROBE_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful WhatsApp AI assistant. You can generate images when requested. Be friendly and helpful.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub image: ImageConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ImageConfig {
    /// Falls back to `llm.api_key` when unset.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub default_size: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub history_limit: u32,
    pub tool_timeout_secs: u64,
    pub send_timeout_secs: u64,
    pub sender_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub gateway_api_key: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://chatrelay.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            gateway: GatewayConfig {
                api_key: String::new().into(),
                base_url: "https://api.fonnte.com".to_string(),
                timeout_secs: 15,
                max_retries: 3,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4-turbo-preview".to_string(),
                max_tokens: 1000,
                timeout_secs: 60,
            },
            image: ImageConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "dall-e-2".to_string(),
                default_size: "1024x1024".to_string(),
                timeout_secs: 45,
            },
            agent: AgentConfig {
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                history_limit: 10,
                tool_timeout_secs: 60,
                send_timeout_secs: 90,
                sender_idle_secs: 300,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Worst case for one delivery: every attempt times out and every retry
    /// waits the full backoff.
    pub fn delivery_budget_secs(&self) -> u64 {
        let retries = u64::from(self.max_retries);
        self.timeout_secs
            .saturating_mul(retries + 1)
            .saturating_add(retries.saturating_mul(GATEWAY_MAX_BACKOFF_SECS))
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ImageConfig {
    pub fn effective_api_key(&self, llm: &LlmConfig) -> SecretString {
        match &self.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => key.clone(),
            _ => llm.api_key.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn generation_budget_secs(&self) -> u64 {
        self.timeout_secs.saturating_add(IMAGE_PROBE_TIMEOUT_SECS)
    }
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn sender_idle(&self) -> Duration {
        Duration::from_secs(self.sender_idle_secs)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("chatrelay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(api_key) = gateway.api_key {
                self.gateway.api_key = secret_value(api_key);
            }
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = base_url;
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = gateway.max_retries {
                self.gateway.max_retries = max_retries;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = secret_value(api_key);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(image) = patch.image {
            if let Some(api_key) = image.api_key {
                self.image.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = image.base_url {
                self.image.base_url = base_url;
            }
            if let Some(model) = image.model {
                self.image.model = model;
            }
            if let Some(default_size) = image.default_size {
                self.image.default_size = default_size;
            }
            if let Some(timeout_secs) = image.timeout_secs {
                self.image.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(system_prompt) = agent.system_prompt {
                self.agent.system_prompt = system_prompt;
            }
            if let Some(history_limit) = agent.history_limit {
                self.agent.history_limit = history_limit;
            }
            if let Some(tool_timeout_secs) = agent.tool_timeout_secs {
                self.agent.tool_timeout_secs = tool_timeout_secs;
            }
            if let Some(send_timeout_secs) = agent.send_timeout_secs {
                self.agent.send_timeout_secs = send_timeout_secs;
            }
            if let Some(sender_idle_secs) = agent.sender_idle_secs {
                self.agent.sender_idle_secs = sender_idle_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CHATRELAY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CHATRELAY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CHATRELAY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CHATRELAY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHATRELAY_GATEWAY_API_KEY") {
            self.gateway.api_key = secret_value(value);
        }
        if let Some(value) = read_env("CHATRELAY_GATEWAY_BASE_URL") {
            self.gateway.base_url = value;
        }
        if let Some(value) = read_env("CHATRELAY_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("CHATRELAY_GATEWAY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_GATEWAY_MAX_RETRIES") {
            self.gateway.max_retries = parse_u32("CHATRELAY_GATEWAY_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("CHATRELAY_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("CHATRELAY_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("CHATRELAY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CHATRELAY_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("CHATRELAY_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CHATRELAY_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHATRELAY_IMAGE_API_KEY") {
            self.image.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CHATRELAY_IMAGE_BASE_URL") {
            self.image.base_url = value;
        }
        if let Some(value) = read_env("CHATRELAY_IMAGE_MODEL") {
            self.image.model = value;
        }
        if let Some(value) = read_env("CHATRELAY_IMAGE_DEFAULT_SIZE") {
            self.image.default_size = value;
        }
        if let Some(value) = read_env("CHATRELAY_IMAGE_TIMEOUT_SECS") {
            self.image.timeout_secs = parse_u64("CHATRELAY_IMAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHATRELAY_AGENT_SYSTEM_PROMPT") {
            self.agent.system_prompt = value;
        }
        if let Some(value) = read_env("CHATRELAY_AGENT_HISTORY_LIMIT") {
            self.agent.history_limit = parse_u32("CHATRELAY_AGENT_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_AGENT_TOOL_TIMEOUT_SECS") {
            self.agent.tool_timeout_secs = parse_u64("CHATRELAY_AGENT_TOOL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_AGENT_SEND_TIMEOUT_SECS") {
            self.agent.send_timeout_secs = parse_u64("CHATRELAY_AGENT_SEND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_AGENT_SENDER_IDLE_SECS") {
            self.agent.sender_idle_secs = parse_u64("CHATRELAY_AGENT_SENDER_IDLE_SECS", &value)?;
        }

        if let Some(value) = read_env("CHATRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("CHATRELAY_SERVER_PORT").or_else(|| read_env("PORT"));
        if let Some(value) = port {
            self.server.port = parse_u16("CHATRELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CHATRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CHATRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CHATRELAY_LOGGING_LEVEL").or_else(|| read_env("CHATRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CHATRELAY_LOGGING_FORMAT").or_else(|| read_env("CHATRELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key);
        }
        if let Some(gateway_api_key) = overrides.gateway_api_key {
            self.gateway.api_key = secret_value(gateway_api_key);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_gateway(&self.gateway)?;
        validate_llm(&self.llm)?;
        validate_image(&self.image)?;
        validate_agent(&self.agent)?;
        validate_timeout_budgets(&self.agent, &self.gateway, &self.image)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("chatrelay.toml"), PathBuf::from("config/chatrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gateway.api_key is required. Copy the device token from the Fonnte dashboard or set CHATRELAY_GATEWAY_API_KEY".to_string(),
        ));
    }
    validate_http_url("gateway.base_url", &gateway.base_url)?;

    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if gateway.max_retries > 10 {
        return Err(ConfigError::Validation(
            "gateway.max_retries must be at most 10".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Set it in chatrelay.toml or via CHATRELAY_LLM_API_KEY"
                .to_string(),
        ));
    }
    validate_http_url("llm.base_url", &llm.base_url)?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_image(image: &ImageConfig) -> Result<(), ConfigError> {
    validate_http_url("image.base_url", &image.base_url)?;

    match image.default_size.as_str() {
        "256x256" | "512x512" | "1024x1024" => {}
        _ => {
            return Err(ConfigError::Validation(
                "image.default_size must be one of 256x256|512x512|1024x1024".to_string(),
            ))
        }
    }
    if image.timeout_secs == 0 || image.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "image.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.system_prompt.trim().is_empty() {
        return Err(ConfigError::Validation("agent.system_prompt must not be empty".to_string()));
    }
    if agent.history_limit == 0 {
        return Err(ConfigError::Validation(
            "agent.history_limit must be greater than zero".to_string(),
        ));
    }
    if agent.tool_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.tool_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if agent.send_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.send_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if agent.sender_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "agent.sender_idle_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// The orchestrator's outer timeouts must leave room for the clients' own
/// timeouts and retries, or they cut delivery short.
fn validate_timeout_budgets(
    agent: &AgentConfig,
    gateway: &GatewayConfig,
    image: &ImageConfig,
) -> Result<(), ConfigError> {
    let delivery_budget = gateway.delivery_budget_secs();
    if agent.send_timeout_secs < delivery_budget {
        return Err(ConfigError::Validation(format!(
            "agent.send_timeout_secs ({}) must be at least {delivery_budget}: \
             gateway.timeout_secs x (gateway.max_retries + 1) plus {GATEWAY_MAX_BACKOFF_SECS}s backoff per retry",
            agent.send_timeout_secs
        )));
    }

    let generation_budget = image.generation_budget_secs();
    if agent.tool_timeout_secs < generation_budget {
        return Err(ConfigError::Validation(format!(
            "agent.tool_timeout_secs ({}) must be at least {generation_budget}: \
             image.timeout_secs plus the {IMAGE_PROBE_TIMEOUT_SECS}s image URL probe",
            agent.tool_timeout_secs
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    llm: Option<LlmPatch>,
    image: Option<ImagePatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ImagePatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    default_size: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    system_prompt: Option<String>,
    history_limit: Option<u32>,
    tool_timeout_secs: Option<u64>,
    send_timeout_secs: Option<u64>,
    sender_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
