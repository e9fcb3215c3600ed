use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use holdwise_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Renders the effective configuration. Secrets are never printed.
pub fn run(json: bool) -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    if json {
        return serde_json::to_string_pretty(&config.redacted())
            .unwrap_or_else(|error| format!("config rendering failed: {error}"));
    }

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    render(&config, config_file_doc.as_ref(), config_file_path.as_deref())
}

fn render(config: &AppConfig, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    for (key_path, env_key, value) in fields(config) {
        lines.push(render_line(key_path, &value, field_source(key_path, env_key, file_doc, file_path)));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<(&'static str, Option<&'static str>, String)> {
    let secret = |present: bool| (if present { "<redacted>" } else { "<unset>" }).to_string();
    let optional = |value: Option<&String>| value.cloned().unwrap_or_else(|| "<unset>".to_string());

    vec![
        ("database.url", Some("HOLDWISE_DATABASE_URL"), config.database.url.clone()),
        (
            "database.max_connections",
            Some("HOLDWISE_DATABASE_MAX_CONNECTIONS"),
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            Some("HOLDWISE_DATABASE_TIMEOUT_SECS"),
            config.database.timeout_secs.to_string(),
        ),
        ("llm.provider", Some("HOLDWISE_LLM_PROVIDER"), format!("{:?}", config.llm.provider)),
        ("llm.model", Some("HOLDWISE_LLM_MODEL"), config.llm.model.clone()),
        ("llm.base_url", Some("HOLDWISE_LLM_BASE_URL"), optional(config.llm.base_url.as_ref())),
        ("llm.api_key", Some("HOLDWISE_LLM_API_KEY"), secret(config.llm.api_key.is_some())),
        ("llm.timeout_secs", Some("HOLDWISE_LLM_TIMEOUT_SECS"), config.llm.timeout_secs.to_string()),
        ("llm.max_tokens", Some("HOLDWISE_LLM_MAX_TOKENS"), config.llm.max_tokens.to_string()),
        ("llm.temperature", None, config.llm.temperature.to_string()),
        ("agent.max_turns", Some("HOLDWISE_AGENT_MAX_TURNS"), config.agent.max_turns.to_string()),
        ("agent.max_rows", Some("HOLDWISE_AGENT_MAX_ROWS"), config.agent.max_rows.to_string()),
        (
            "agent.statement_timeout_secs",
            Some("HOLDWISE_AGENT_STATEMENT_TIMEOUT_SECS"),
            config.agent.statement_timeout_secs.to_string(),
        ),
        ("agent.allowed_tables", None, config.agent.allowed_tables.join(", ")),
        ("agent.retrieval_top_k", None, config.agent.retrieval_top_k.to_string()),
        ("retrieval.enabled", Some("HOLDWISE_RETRIEVAL_ENABLED"), config.retrieval.enabled.to_string()),
        (
            "retrieval.endpoint",
            Some("HOLDWISE_RETRIEVAL_ENDPOINT"),
            optional(config.retrieval.endpoint.as_ref()),
        ),
        ("cache.capacity", Some("HOLDWISE_CACHE_CAPACITY"), config.cache.capacity.to_string()),
        ("cache.ttl_secs", Some("HOLDWISE_CACHE_TTL_SECS"), config.cache.ttl_secs.to_string()),
        ("auth.api_keys", None, format!("{} configured (<redacted>)", config.auth.api_keys.len())),
        (
            "server.bind_address",
            Some("HOLDWISE_SERVER_BIND_ADDRESS"),
            config.server.bind_address.clone(),
        ),
        ("server.port", Some("HOLDWISE_SERVER_PORT"), config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            Some("HOLDWISE_SERVER_GRACEFUL_SHUTDOWN_SECS"),
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", Some("HOLDWISE_LOGGING_LEVEL"), config.logging.level.clone()),
        ("logging.format", Some("HOLDWISE_LOGGING_FORMAT"), format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("holdwise.toml"), PathBuf::from("config/holdwise.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use holdwise_core::config::{ApiKeyEntry, AppConfig};
    use secrecy::SecretString;
    use toml::Value;

    use super::render;

    #[test]
    fn file_values_are_attributed_and_secrets_hidden() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some(SecretString::from("sk-live-123".to_string()));
        config.auth.api_keys.push(ApiKeyEntry {
            key: SecretString::from("caller-secret".to_string()),
            user_id: "analyst-1".to_string(),
        });
        let doc: Value = "[agent]\nmax_rows = 1000\n".parse().expect("toml");

        let rendered = render(&config, Some(&doc), Some(Path::new("holdwise.toml")));

        assert!(rendered.contains("- agent.max_rows = 1000 (source: file (holdwise.toml))"));
        assert!(rendered.contains("- llm.api_key = <redacted>"));
        assert!(rendered.contains("- auth.api_keys = 1 configured (<redacted>)"));
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("caller-secret"));
    }
}
