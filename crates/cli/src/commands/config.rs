use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config.llm.api_key.as_ref().map(|key| redact_secret(key.expose_secret()));

    vec![
        Field {
            key_path: "database.backend",
            value: format!("{:?}", config.database.backend),
            env_keys: &["PARLEY_DATABASE_BACKEND"],
        },
        Field {
            key_path: "database.url",
            value: config.database.url.clone(),
            env_keys: &["PARLEY_DATABASE_URL"],
        },
        Field {
            key_path: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["PARLEY_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key_path: "llm.provider",
            value: format!("{:?}", config.llm.provider),
            env_keys: &["PARLEY_LLM_PROVIDER"],
        },
        Field {
            key_path: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["PARLEY_LLM_MODEL"],
        },
        Field {
            key_path: "llm.base_url",
            value: config.llm.effective_base_url().to_string(),
            env_keys: &["PARLEY_LLM_BASE_URL"],
        },
        Field {
            key_path: "llm.api_key",
            value: api_key.unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["PARLEY_LLM_API_KEY", "OPENAI_API_KEY"],
        },
        Field {
            key_path: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: &["PARLEY_LLM_TEMPERATURE"],
        },
        Field {
            key_path: "crm.timeout_secs",
            value: config.crm.timeout_secs.to_string(),
            env_keys: &["PARLEY_CRM_TIMEOUT_SECS"],
        },
        Field {
            key_path: "crm.default_page_length",
            value: config.crm.default_page_length.to_string(),
            env_keys: &["PARLEY_CRM_DEFAULT_PAGE_LENGTH"],
        },
        Field {
            key_path: "crm.allow_create",
            value: config.crm.allow_create.to_string(),
            env_keys: &["PARLEY_CRM_ALLOW_CREATE"],
        },
        Field {
            key_path: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["PARLEY_SERVER_BIND_ADDRESS"],
        },
        Field {
            key_path: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["PARLEY_SERVER_PORT"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["parley.toml", "config/parley.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

/// Keeps a recognizable prefix such as `sk-` and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn redaction_never_echoes_the_secret_body() {
        assert_eq!(redact_secret("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_secret("plainsecret"), "<redacted>");
        assert_eq!(redact_secret("   "), "<empty>");
    }

    #[test]
    fn nested_toml_keys_are_detected() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
