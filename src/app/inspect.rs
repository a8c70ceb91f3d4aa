//! Offline commands: vet, templates and status.
//!
//! None of these open a database connection or call a generation API.

use super::{
    helpers::{effective_model, read_input, resolve_provider},
    types::CommandOutput
};
use crate::{
    cli::Provider,
    config::Config,
    error::AppResult,
    executor::apply_row_limit,
    fallback::FallbackMatcher,
    gate::{Verdict, referenced_tables},
    output::{
        OutputOptions, StatusReport, VetReport, format_status, format_templates, format_verdict
    }
};

/// Exit code when the gate rejects something
const REJECTED_EXIT_CODE: i32 = 2;

/// Run only the security gate on `sql` (or stdin for "-").
///
/// # Example
///
/// ```
/// use sql_query_gate::{app::run_vet, config::Config, output::OutputOptions};
///
/// let out = run_vet("SELECT * FROM invoices", &Config::default(), &OutputOptions::default())
///     .unwrap();
/// assert_eq!(out.exit_code, 0);
/// ```
pub fn run_vet(sql: &str, config: &Config, opts: &OutputOptions) -> AppResult<CommandOutput> {
    let sql = read_input(sql)?;
    let policy = config.security_policy()?;
    let verdict = policy.gate().vet(&sql);
    let tables = referenced_tables(&sql).into_vec();

    let report = match verdict {
        Verdict::Accepted(vetted) => VetReport {
            sql: sql.clone(),
            accepted: true,
            executable_sql: Some(apply_row_limit(vetted.sql(), policy.row_cap).into_owned()),
            check: None,
            reason: None,
            tables
        },
        Verdict::Rejected(rejection) => VetReport {
            sql: sql.clone(),
            accepted: false,
            executable_sql: None,
            check: Some(rejection.check().id()),
            reason: Some(rejection.to_string()),
            tables
        }
    };

    let exit_code = if report.accepted { 0 } else { REJECTED_EXIT_CODE };
    Ok(CommandOutput::success(format_verdict(&report, opts)?).with_exit_code(exit_code))
}

/// List the fallback templates, each vetted against the configured gate.
pub fn run_templates(config: &Config, opts: &OutputOptions) -> AppResult<CommandOutput> {
    let gate = config.security_policy()?.gate();
    let audits = FallbackMatcher::builtin().audit(&gate);
    let exit_code = if audits.iter().all(|a| a.accepted) {
        0
    } else {
        REJECTED_EXIT_CODE
    };
    Ok(CommandOutput::success(format_templates(&audits, opts)?).with_exit_code(exit_code))
}

/// Report what is configured.
pub fn run_status(config: &Config, opts: &OutputOptions) -> AppResult<CommandOutput> {
    let policy = config.security_policy()?;
    let provider = resolve_provider(&config.llm)?;
    let (provider_name, model) = match provider {
        Some(p) => (p.name().to_string(), effective_model(p, &config.llm)),
        None => (String::from("none"), String::from("-"))
    };

    let report = StatusReport {
        status: "ok",
        generation_configured: match provider {
            Some(Provider::Ollama) => true,
            Some(_) => config.has_generation_credential(),
            None => false
        },
        provider: provider_name,
        model,
        database_configured: !config.database.url.trim().is_empty(),
        allowed_tables: policy.allowlist.iter().map(str::to_string).collect(),
        max_rows: policy.row_cap.get(),
        fallback_enabled: config.fallback.enabled,
        fallback_templates: FallbackMatcher::builtin().templates().len(),
        strict_parse: policy.strict_parse
    };
    Ok(CommandOutput::success(format_status(&report, opts)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    fn plain() -> OutputOptions {
        OutputOptions {
            colored: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_vet_accepts_and_shows_limit() {
        let out = run_vet("SELECT * FROM invoices", &Config::default(), &plain()).unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("SELECT * FROM invoices LIMIT 100"));
    }

    #[test]
    fn test_vet_rejects_with_exit_code_2() {
        let out = run_vet("SELECT * FROM users", &Config::default(), &plain()).unwrap();
        assert_eq!(out.exit_code, 2);
        assert!(out.stdout.contains("'users'"));
    }

    #[test]
    fn test_templates_pass_default_gate() {
        let out = run_templates(&Config::default(), &plain()).unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("top vendors by spend"));
    }

    #[test]
    fn test_templates_fail_against_narrow_allowlist() {
        let mut config = Config::default();
        config.security.allowed_tables = vec!["invoices".into()];
        let out = run_templates(&config, &plain()).unwrap();
        assert_eq!(out.exit_code, 2);
    }

    #[test]
    fn test_status_without_key() {
        let opts = OutputOptions {
            format: OutputFormat::Json,
            ..plain()
        };
        let out = run_status(&Config::default(), &opts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
        assert_eq!(value["generation_configured"], false);
        assert_eq!(value["provider"], "openai");
        assert_eq!(value["max_rows"], 100);
    }
}
