use std::env;
use std::sync::{Mutex, OnceLock};

use holdwise_cli::commands::{check_sql, config, migrate, seed};
use serde_json::Value;

const IN_MEMORY: &[(&str, &str)] =
    &[("HOLDWISE_DATABASE_URL", "sqlite::memory:"), ("HOLDWISE_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(IN_MEMORY, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("HOLDWISE_DATABASE_URL", "postgres://localhost/holdings")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_loaded_row_counts() {
    with_env(IN_MEMORY, || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["message"], "sample dataset loaded: 3 managers, 4 issuers, 3 filings, 7 holdings");
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("holdwise.db").display());

    with_env(&[("HOLDWISE_DATABASE_URL", url.as_str())], || {
        let first = seed::run(false);
        assert_eq!(first.exit_code, 0, "{}", first.output);

        let second = seed::run(false);
        assert_eq!(second.exit_code, 0, "{}", second.output);
        let message = parse_payload(&second.output)["message"].as_str().unwrap_or_default().to_string();
        assert!(message.starts_with("sample dataset already present"), "{message}");

        let reset = seed::run(true);
        assert_eq!(reset.exit_code, 0, "{}", reset.output);
        assert_eq!(
            parse_payload(&reset.output)["message"],
            "sample dataset loaded: 3 managers, 4 issuers, 3 filings, 7 holdings"
        );
    });
}

#[test]
fn check_sql_uses_configured_row_ceiling() {
    with_env(&[("HOLDWISE_AGENT_MAX_ROWS", "25")], || {
        let accepted = check_sql::run("SELECT name FROM managers", None);
        assert_eq!(accepted.exit_code, 0);
        assert_eq!(parse_payload(&accepted.output)["message"], "SELECT name FROM managers LIMIT 25");

        let rejected = check_sql::run("DELETE FROM managers", None);
        assert_eq!(rejected.exit_code, 1);
        let payload = parse_payload(&rejected.output);
        assert_eq!(payload["error_class"], "not_select");
        assert_eq!(payload["message"], "Only SELECT statements allowed, got DELETE");

        let explicit = check_sql::run("SELECT name FROM managers", Some(5));
        assert_eq!(parse_payload(&explicit.output)["message"], "SELECT name FROM managers LIMIT 5");
    });
}

#[test]
fn config_json_redacts_llm_key() {
    with_env(
        &[("HOLDWISE_LLM_PROVIDER", "openai"), ("HOLDWISE_LLM_API_KEY", "sk-very-secret")],
        || {
            let output = config::run(true);
            assert!(!output.contains("sk-very-secret"));

            let payload = parse_payload(&output);
            assert_eq!(payload["llm"]["provider"], "open_ai");
            assert_eq!(payload["llm"]["api_key"], "***redacted***");

            let text = config::run(false);
            assert!(text.contains("- llm.api_key = <redacted> (source: env (HOLDWISE_LLM_API_KEY))"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HOLDWISE_DATABASE_URL",
        "HOLDWISE_DATABASE_MAX_CONNECTIONS",
        "HOLDWISE_DATABASE_TIMEOUT_SECS",
        "HOLDWISE_LLM_PROVIDER",
        "HOLDWISE_LLM_API_KEY",
        "HOLDWISE_LLM_BASE_URL",
        "HOLDWISE_LLM_MODEL",
        "HOLDWISE_LLM_TIMEOUT_SECS",
        "HOLDWISE_AGENT_MAX_TURNS",
        "HOLDWISE_AGENT_MAX_ROWS",
        "HOLDWISE_RETRIEVAL_ENABLED",
        "HOLDWISE_RETRIEVAL_ENDPOINT",
        "HOLDWISE_SERVER_BIND_ADDRESS",
        "HOLDWISE_SERVER_PORT",
        "HOLDWISE_LOGGING_LEVEL",
        "HOLDWISE_LOGGING_FORMAT",
        "HOLDWISE_LOG_LEVEL",
        "HOLDWISE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
