use std::env;
use std::sync::{Mutex, OnceLock};

use parley_cli::commands::{ask, config, doctor};
use serde_json::Value;

fn ask_args(query: &str, user_id: i64) -> ask::AskArgs {
    ask::AskArgs {
        query: query.to_string(),
        user_id,
        api_url: "simulation".to_string(),
        api_key: "simulation".to_string(),
        api_secret: "simulation".to_string(),
    }
}

#[test]
fn ask_without_model_key_returns_fallback_reply() {
    with_env(&[], || {
        let result = ask::run(ask_args("show me qualified leads", 7));
        assert_eq!(result.exit_code, 0, "expected degraded turn to still succeed");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["intent"], "error");
        assert_eq!(payload["data"]["confidence"], 0.0);
        assert_eq!(payload["data"]["exchange"]["userId"], 7);
        assert!(payload["data"].get("actionResult").is_none());
    });
}

#[test]
fn ask_with_blank_query_is_rejected() {
    with_env(&[], || {
        let result = ask::run(ask_args("   ", 7));
        assert_eq!(result.exit_code, 6, "expected invalid request code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_request");
    });
}

#[test]
fn ask_returns_config_failure_for_unknown_backend() {
    with_env(&[("PARLEY_DATABASE_BACKEND", "postgres")], || {
        let result = ask::run(ask_args("hello", 1));
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_records_into_sqlite_backend() {
    with_env(
        &[("PARLEY_DATABASE_BACKEND", "sqlite"), ("PARLEY_DATABASE_URL", "sqlite::memory:")],
        || {
            let result = ask::run(ask_args("any open tasks?", 3));
            assert_eq!(result.exit_code, 0, "expected sqlite-backed turn to succeed");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["data"]["exchange"]["id"], 1);
        },
    );
}

#[test]
fn doctor_warns_when_model_key_is_missing() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "a missing key should not fail readiness");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "warn");
        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        let llm = checks.iter().find(|check| check["name"] == "llm_credentials");
        assert_eq!(llm.map(|check| check["status"].clone()), Some(Value::from("warn")));
    });
}

#[test]
fn doctor_passes_with_key_and_sqlite_store() {
    with_env(
        &[
            ("PARLEY_LLM_API_KEY", "sk-test"),
            ("PARLEY_DATABASE_BACKEND", "sqlite"),
            ("PARLEY_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 0);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "pass");
        },
    );
}

#[test]
fn doctor_fails_and_skips_checks_on_invalid_config() {
    with_env(&[("PARLEY_LOG_FORMAT", "xml")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [skip] exchange_store"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_api_key() {
    with_env(&[("PARLEY_LLM_API_KEY", "sk-very-secret"), ("PARLEY_LLM_MODEL", "gpt-4o-mini")], || {
        let output = config::run();

        assert!(output.contains("- llm.api_key = sk-*** (source: env (PARLEY_LLM_API_KEY))"));
        assert!(output.contains("- llm.model = gpt-4o-mini (source: env (PARLEY_LLM_MODEL))"));
        assert!(output.contains("- crm.allow_create = false (source: default)"));
        assert!(!output.contains("very-secret"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PARLEY_DATABASE_BACKEND",
        "PARLEY_DATABASE_URL",
        "PARLEY_DATABASE_MAX_CONNECTIONS",
        "PARLEY_DATABASE_TIMEOUT_SECS",
        "PARLEY_LLM_PROVIDER",
        "PARLEY_LLM_API_KEY",
        "OPENAI_API_KEY",
        "PARLEY_LLM_BASE_URL",
        "PARLEY_LLM_MODEL",
        "PARLEY_LLM_TIMEOUT_SECS",
        "PARLEY_LLM_TEMPERATURE",
        "PARLEY_CRM_TIMEOUT_SECS",
        "PARLEY_CRM_DEFAULT_PAGE_LENGTH",
        "PARLEY_CRM_ALLOW_CREATE",
        "PARLEY_SERVER_BIND_ADDRESS",
        "PARLEY_SERVER_PORT",
        "PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PARLEY_LOGGING_LEVEL",
        "PARLEY_LOGGING_FORMAT",
        "PARLEY_LOG_LEVEL",
        "PARLEY_LOG_FORMAT",
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
