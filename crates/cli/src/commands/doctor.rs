use parley_core::config::{AppConfig, ExchangeBackend, LlmProvider, LoadOptions};
use parley_core::UserId;
use parley_db::open_exchange_store;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exits non-zero only on failed checks; a missing model key is a warning.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.push(check_exchange_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credentials", "exchange_store"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let any_warn = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (any_fail, any_warn) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    if config.llm.has_credentials() {
        let details = match config.llm.provider {
            LlmProvider::OpenAi => format!("api key present for model `{}`", config.llm.model),
            LlmProvider::Ollama => {
                format!("ollama at `{}` needs no api key", config.llm.effective_base_url())
            }
        };
        return DoctorCheck { name: "llm_credentials", status: CheckStatus::Pass, details };
    }

    DoctorCheck {
        name: "llm_credentials",
        status: CheckStatus::Warn,
        details: "no api key configured; queries will receive fallback replies".to_string(),
    }
}

fn check_exchange_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "exchange_store",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let store = open_exchange_store(&config.database)
            .await
            .map_err(|error| format!("failed to open exchange store: {error}"))?;
        store
            .repository
            .list_for_user(UserId(0), Some(1))
            .await
            .map_err(|error| format!("exchange store probe failed: {error}"))?;

        if let Some(pool) = store.pool {
            pool.close().await;
        }
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => {
            let details = match config.database.backend {
                ExchangeBackend::Memory => "in-memory exchange store ready".to_string(),
                ExchangeBackend::Sqlite => {
                    format!("sqlite exchange store migrated at `{}`", config.database.url)
                }
            };
            DoctorCheck { name: "exchange_store", status: CheckStatus::Pass, details }
        }
        Err(error) => DoctorCheck { name: "exchange_store", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
