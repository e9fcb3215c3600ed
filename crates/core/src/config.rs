use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sql::{DEFAULT_ALLOWED_TABLES, DEFAULT_MAX_LIMIT};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
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
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_turns: u32,
    pub max_rows: u32,
    pub statement_timeout_secs: u64,
    pub allowed_tables: Vec<String>,
    pub retrieval_top_k: u32,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Clone, Debug)]
pub struct ApiKeyEntry {
    pub key: SecretString,
    pub user_id: String,
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
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub max_turns: Option<u32>,
    pub max_rows: Option<u32>,
    pub retrieval_endpoint: Option<String>,
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
                url: "sqlite://holdwise.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_tokens: 2000,
                temperature: 0.0,
            },
            agent: AgentConfig {
                max_turns: 10,
                max_rows: DEFAULT_MAX_LIMIT,
                statement_timeout_secs: 5,
                allowed_tables: DEFAULT_ALLOWED_TABLES.iter().map(|t| t.to_string()).collect(),
                retrieval_top_k: 5,
            },
            retrieval: RetrievalConfig { enabled: false, endpoint: None, timeout_secs: 10 },
            cache: CacheConfig { capacity: 100, ttl_secs: 3600 },
            auth: AuthConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("holdwise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Effective configuration as TOML-shaped JSON with secrets redacted.
    pub fn redacted(&self) -> serde_json::Value {
        let redact = |secret: Option<&SecretString>| secret.map(|_| "***redacted***");
        serde_json::json!({
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "llm": {
                "provider": self.llm.provider,
                "api_key": redact(self.llm.api_key.as_ref()),
                "base_url": self.llm.base_url,
                "model": self.llm.model,
                "timeout_secs": self.llm.timeout_secs,
                "max_tokens": self.llm.max_tokens,
                "temperature": self.llm.temperature,
            },
            "agent": {
                "max_turns": self.agent.max_turns,
                "max_rows": self.agent.max_rows,
                "statement_timeout_secs": self.agent.statement_timeout_secs,
                "allowed_tables": self.agent.allowed_tables,
                "retrieval_top_k": self.agent.retrieval_top_k,
            },
            "retrieval": {
                "enabled": self.retrieval.enabled,
                "endpoint": self.retrieval.endpoint,
                "timeout_secs": self.retrieval.timeout_secs,
            },
            "cache": {
                "capacity": self.cache.capacity,
                "ttl_secs": self.cache.ttl_secs,
            },
            "auth": {
                "api_keys": self
                    .auth
                    .api_keys
                    .iter()
                    .map(|entry| serde_json::json!({
                        "key": redact(Some(&entry.key)),
                        "user_id": entry.user_id,
                    }))
                    .collect::<Vec<_>>(),
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
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

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_turns) = agent.max_turns {
                self.agent.max_turns = max_turns;
            }
            if let Some(max_rows) = agent.max_rows {
                self.agent.max_rows = max_rows;
            }
            if let Some(statement_timeout_secs) = agent.statement_timeout_secs {
                self.agent.statement_timeout_secs = statement_timeout_secs;
            }
            if let Some(allowed_tables) = agent.allowed_tables {
                self.agent.allowed_tables = allowed_tables;
            }
            if let Some(retrieval_top_k) = agent.retrieval_top_k {
                self.agent.retrieval_top_k = retrieval_top_k;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(enabled) = retrieval.enabled {
                self.retrieval.enabled = enabled;
            }
            if let Some(endpoint) = retrieval.endpoint {
                self.retrieval.endpoint = Some(endpoint);
            }
            if let Some(timeout_secs) = retrieval.timeout_secs {
                self.retrieval.timeout_secs = timeout_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(capacity) = cache.capacity {
                self.cache.capacity = capacity;
            }
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(api_keys) = auth.api_keys {
                self.auth.api_keys = api_keys
                    .into_iter()
                    .map(|entry| ApiKeyEntry { key: secret_value(entry.key), user_id: entry.user_id })
                    .collect();
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
        if let Some(value) = read_env("HOLDWISE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("HOLDWISE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("HOLDWISE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("HOLDWISE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOLDWISE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HOLDWISE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HOLDWISE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HOLDWISE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("HOLDWISE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("HOLDWISE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("HOLDWISE_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("HOLDWISE_AGENT_MAX_TURNS") {
            self.agent.max_turns = parse_u32("HOLDWISE_AGENT_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_AGENT_MAX_ROWS") {
            self.agent.max_rows = parse_u32("HOLDWISE_AGENT_MAX_ROWS", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_AGENT_STATEMENT_TIMEOUT_SECS") {
            self.agent.statement_timeout_secs =
                parse_u64("HOLDWISE_AGENT_STATEMENT_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("HOLDWISE_RETRIEVAL_ENABLED") {
            self.retrieval.enabled = parse_bool("HOLDWISE_RETRIEVAL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_RETRIEVAL_ENDPOINT") {
            self.retrieval.endpoint = Some(value);
        }

        if let Some(value) = read_env("HOLDWISE_CACHE_CAPACITY") {
            self.cache.capacity = parse_u32("HOLDWISE_CACHE_CAPACITY", &value)? as usize;
        }
        if let Some(value) = read_env("HOLDWISE_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("HOLDWISE_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("HOLDWISE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("HOLDWISE_SERVER_PORT") {
            self.server.port = parse_u16("HOLDWISE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("HOLDWISE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("HOLDWISE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("HOLDWISE_LOGGING_LEVEL").or_else(|| read_env("HOLDWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HOLDWISE_LOGGING_FORMAT").or_else(|| read_env("HOLDWISE_LOG_FORMAT"));
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
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(max_turns) = overrides.max_turns {
            self.agent.max_turns = max_turns;
        }
        if let Some(max_rows) = overrides.max_rows {
            self.agent.max_rows = max_rows;
        }
        if let Some(endpoint) = overrides.retrieval_endpoint {
            self.retrieval.enabled = true;
            self.retrieval.endpoint = Some(endpoint);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_retrieval(&self.retrieval)?;
        validate_cache(&self.cache)?;
        validate_auth(&self.auth)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("holdwise.toml"), PathBuf::from("config/holdwise.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_turns == 0 || agent.max_turns > 50 {
        return Err(ConfigError::Validation("agent.max_turns must be in range 1..=50".to_string()));
    }

    if agent.max_rows == 0 {
        return Err(ConfigError::Validation(
            "agent.max_rows must be greater than zero".to_string(),
        ));
    }

    if agent.statement_timeout_secs == 0 || agent.statement_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.statement_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent.allowed_tables.iter().all(|table| table.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "agent.allowed_tables must name at least one table".to_string(),
        ));
    }

    if agent.retrieval_top_k == 0 || agent.retrieval_top_k > 10 {
        return Err(ConfigError::Validation(
            "agent.retrieval_top_k must be in range 1..=10".to_string(),
        ));
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if !retrieval.enabled {
        return Ok(());
    }

    match &retrieval.endpoint {
        Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {}
        Some(_) => {
            return Err(ConfigError::Validation(
                "retrieval.endpoint must start with http:// or https://".to_string(),
            ))
        }
        None => {
            return Err(ConfigError::Validation(
                "retrieval.enabled is true but retrieval.endpoint is not set".to_string(),
            ))
        }
    }

    if retrieval.timeout_secs == 0 || retrieval.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "retrieval.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.capacity == 0 {
        return Err(ConfigError::Validation(
            "cache.capacity must be greater than zero".to_string(),
        ));
    }
    if cache.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "cache.ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    for entry in &auth.api_keys {
        if entry.key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation("auth.api_keys entries need a key".to_string()));
        }
        if entry.user_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.api_keys entries need a user_id".to_string(),
            ));
        }
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    retrieval: Option<RetrievalPatch>,
    cache: Option<CachePatch>,
    auth: Option<AuthPatch>,
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
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_turns: Option<u32>,
    max_rows: Option<u32>,
    statement_timeout_secs: Option<u64>,
    allowed_tables: Option<Vec<String>>,
    retrieval_top_k: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    capacity: Option<usize>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    api_keys: Option<Vec<ApiKeyPatch>>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyPatch {
    key: String,
    user_id: String,
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

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_bounds() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.agent.max_turns == 10, "default turn bound should be 10")?;
        ensure(config.agent.max_rows == 1000, "default row ceiling should be 1000")?;
        ensure(config.agent.statement_timeout_secs == 5, "default statement timeout is 5s")?;
        ensure(config.cache.capacity == 100, "default cache capacity should be 100")?;
        ensure(config.cache.ttl_secs == 3600, "default cache ttl should be one hour")?;
        ensure(
            config.agent.allowed_tables == vec!["managers", "issuers", "filings", "holdings"],
            "default whitelist should be the four 13F tables",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HOLDWISE_LLM_KEY", "sk-from-env");
        env::set_var("TEST_HOLDWISE_CALLER_KEY", "caller-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("holdwise.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_HOLDWISE_LLM_KEY}"
model = "gpt-4o-mini"

[[auth.api_keys]]
key = "${TEST_HOLDWISE_CALLER_KEY}"
user_id = "analyst-1"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "llm api key should be interpolated from environment",
            )?;
            ensure(config.auth.api_keys.len() == 1, "one caller key should be configured")?;
            ensure(
                config.auth.api_keys[0].key.expose_secret() == "caller-from-env"
                    && config.auth.api_keys[0].user_id == "analyst-1",
                "caller key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_HOLDWISE_LLM_KEY", "TEST_HOLDWISE_CALLER_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("holdwise.toml");
        fs::write(&path, "[llm]\napi_key = \"${HOLDWISE_TEST_NOT_SET}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "HOLDWISE_TEST_NOT_SET"),
            "missing variable should be named",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_LOG_LEVEL", "warn");
        env::set_var("HOLDWISE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["HOLDWISE_LOG_LEVEL", "HOLDWISE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("HOLDWISE_AGENT_MAX_TURNS", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("holdwise.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[agent]
max_turns = 3
max_rows = 250

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.agent.max_turns == 7, "env turn bound should win over file")?;
            ensure(config.agent.max_rows == 250, "file row ceiling should win over default")
        })();

        clear_vars(&["HOLDWISE_DATABASE_URL", "HOLDWISE_AGENT_MAX_TURNS"]);
        result
    }

    #[test]
    fn invalid_env_override_names_the_variable() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_AGENT_MAX_ROWS", "lots");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override failure".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "HOLDWISE_AGENT_MAX_ROWS"),
                "invalid override should name the variable",
            ),
        };

        clear_vars(&["HOLDWISE_AGENT_MAX_ROWS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["HOLDWISE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn turn_bound_is_range_checked() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { max_turns: Some(0), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected max_turns validation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("agent.max_turns")),
            "validation failure should mention agent.max_turns",
        )
    }

    #[test]
    fn retrieval_requires_an_endpoint_when_enabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_RETRIEVAL_ENABLED", "true");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected retrieval validation failure".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("retrieval.endpoint")),
                "validation failure should mention retrieval.endpoint",
            ),
        };

        clear_vars(&["HOLDWISE_RETRIEVAL_ENABLED"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HOLDWISE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let redacted = config.redacted().to_string();

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !redacted.contains("sk-secret-value"),
                "redacted view should not contain api key",
            )?;
            ensure(redacted.contains("***redacted***"), "redacted view should mark the key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["HOLDWISE_LLM_API_KEY"]);
        result
    }
}
