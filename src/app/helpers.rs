//! Helper functions for CLI operations.
//!
//! Reading input, folding command-line overrides into the loaded
//! configuration, and turning that configuration into a generator and a
//! pipeline.

use std::{
    io::{self, Read},
    sync::Arc,
    time::Duration
};

use tracing::warn;

use super::types::AskParams;
use crate::{
    cli::{Format, GlobalArgs, Provider},
    config::{Config, LlmConfig},
    error::{AppResult, GeneratorError, config_error, file_read_error},
    executor::QueryStore,
    fallback::FallbackMatcher,
    llm::{DEFAULT_API_URL, LlmClient, LlmProvider, SqlGenerator, UnavailableGenerator},
    output::{OutputFormat, OutputOptions},
    pipeline::Pipeline
};

/// Provider names that switch generation off and leave only fallback
const DISABLED_PROVIDERS: [&str; 2] = ["none", "disabled"];

/// Reads a command argument, or all of stdin when it is "-".
///
/// # Example
///
/// ```
/// use sql_query_gate::app::read_input;
///
/// assert_eq!(read_input("SELECT 1").unwrap(), "SELECT 1");
/// ```
pub fn read_input(value: &str) -> AppResult<String> {
    if value == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| file_read_error("stdin", e))?;
        Ok(buffer)
    } else {
        Ok(value.to_string())
    }
}

/// Converts a CLI format enum to the internal output format type.
pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml
    }
}

/// Create output options from the global flags
pub fn create_output_options(global: &GlobalArgs) -> OutputOptions {
    OutputOptions {
        format:  convert_format(global.output_format),
        colored: !global.no_color,
        verbose: global.verbose
    }
}

/// Fold global command-line flags into the configuration.
///
/// Command-line values win over everything loaded from files and the
/// environment.
///
/// # Example
///
/// ```
/// use sql_query_gate::{app::apply_global_overrides, cli::GlobalArgs, config::Config};
///
/// let mut config = Config::default();
/// let global = GlobalArgs {
///     max_rows: Some(10),
///     no_fallback: true,
///     ..Default::default()
/// };
/// apply_global_overrides(&mut config, &global).unwrap();
/// assert_eq!(config.security.max_rows, 10);
/// assert!(!config.fallback.enabled);
/// ```
pub fn apply_global_overrides(config: &mut Config, global: &GlobalArgs) -> AppResult<()> {
    if let Some(tables) = &global.allowed_tables {
        config.security.allowed_tables = tables.split(',').map(str::to_string).collect();
    }
    if let Some(rows) = global.max_rows {
        if rows == 0 {
            return Err(config_error("--max-rows must be a positive integer"));
        }
        config.security.max_rows = rows;
    }
    if global.no_fallback {
        config.fallback.enabled = false;
    }
    if global.strict {
        config.security.strict_parse = true;
    }
    Ok(())
}

/// Fold `ask` flags into the LLM section
pub fn apply_ask_overrides(config: &mut Config, params: &AskParams) {
    if let Some(provider) = params.provider {
        config.llm.provider = Some(provider.name().to_string());
    }
    if let Some(key) = &params.api_key {
        config.llm.api_key = Some(key.clone());
    }
    if let Some(model) = &params.model {
        config.llm.model = Some(model.clone());
    }
}

/// Provider selected by configuration.
///
/// Unset means the OpenAI-compatible default. `none` disables generation
/// and returns `Ok(None)`; any other unknown name is a configuration error.
pub fn resolve_provider(llm: &LlmConfig) -> AppResult<Option<Provider>> {
    let Some(name) = llm.provider.as_deref() else {
        return Ok(Some(Provider::OpenAI));
    };
    if DISABLED_PROVIDERS
        .iter()
        .any(|d| d.eq_ignore_ascii_case(name.trim()))
    {
        return Ok(None);
    }
    Provider::from_name(name)
        .map(Some)
        .ok_or_else(|| config_error(format!("Unknown LLM provider: '{}'", name)))
}

/// Get effective model name
pub fn effective_model(provider: Provider, llm: &LlmConfig) -> String {
    llm.model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string())
}

/// Build provider settings, or say which credential is missing
pub fn build_llm_provider(
    provider: Provider,
    llm: &LlmConfig
) -> Result<LlmProvider, GeneratorError> {
    let model = effective_model(provider, llm);
    let api_key = llm.api_key.clone().filter(|k| !k.trim().is_empty());
    match provider {
        Provider::OpenAI => Ok(LlmProvider::OpenAI {
            api_key: api_key.ok_or(GeneratorError::MissingCredential("OpenAI"))?,
            api_url: llm
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model
        }),
        Provider::Anthropic => Ok(LlmProvider::Anthropic {
            api_key: api_key.ok_or(GeneratorError::MissingCredential("Anthropic"))?,
            model
        }),
        Provider::Ollama => Ok(LlmProvider::Ollama {
            base_url: llm
                .ollama_url
                .clone()
                .unwrap_or_else(|| String::from("http://localhost:11434")),
            model
        })
    }
}

/// Upper bound on one generation call
pub fn generation_timeout(llm: &LlmConfig) -> AppResult<Duration> {
    if llm.timeout_secs == 0 {
        return Err(config_error("llm.timeout_secs must be a positive integer"));
    }
    Ok(Duration::from_secs(llm.timeout_secs))
}

/// The generator the configuration asks for.
///
/// A missing credential is not a startup error: the generator then fails on
/// every call, and the pipeline may still answer from a fallback template.
pub fn build_generator(llm: &LlmConfig) -> AppResult<Arc<dyn SqlGenerator>> {
    let timeout = generation_timeout(llm)?;
    let Some(provider) = resolve_provider(llm)? else {
        return Ok(Arc::new(UnavailableGenerator::new(GeneratorError::Disabled)));
    };
    match build_llm_provider(provider, llm) {
        Ok(provider) => Ok(Arc::new(LlmClient::new(provider, timeout)?)),
        Err(reason) => {
            warn!(reason = %reason, "SQL generation unavailable");
            Ok(Arc::new(UnavailableGenerator::new(reason)))
        }
    }
}

/// Wire generator, fallback, gate and executor from configuration
pub fn build_pipeline(config: &Config, store: Arc<dyn QueryStore>) -> AppResult<Pipeline> {
    let policy = config.security_policy()?;
    let generator = build_generator(&config.llm)?;
    let fallback = config.fallback.enabled.then(FallbackMatcher::builtin);
    Ok(Pipeline::new(generator, store, &policy)
        .with_fallback(fallback)
        .with_generation_timeout(generation_timeout(&config.llm)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: Option<&str>, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.map(str::to_string),
            api_key: api_key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_unset_provider_is_openai_compatible() {
        assert_eq!(resolve_provider(&llm(None, None)).unwrap(), Some(Provider::OpenAI));
    }

    #[test]
    fn test_groq_alias() {
        assert_eq!(
            resolve_provider(&llm(Some("groq"), None)).unwrap(),
            Some(Provider::OpenAI)
        );
    }

    #[test]
    fn test_none_disables_generation() {
        assert_eq!(resolve_provider(&llm(Some("None"), None)).unwrap(), None);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        assert!(resolve_provider(&llm(Some("watsonx"), None)).is_err());
    }

    #[test]
    fn test_missing_key_names_provider() {
        let err = build_llm_provider(Provider::Anthropic, &llm(None, None)).unwrap_err();
        assert_eq!(err, GeneratorError::MissingCredential("Anthropic"));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let err = build_llm_provider(Provider::OpenAI, &llm(None, Some("  "))).unwrap_err();
        assert!(matches!(err, GeneratorError::MissingCredential(_)));
    }

    #[test]
    fn test_openai_defaults_to_groq_endpoint() {
        let provider = build_llm_provider(Provider::OpenAI, &llm(None, Some("k"))).unwrap();
        match provider {
            LlmProvider::OpenAI {
                api_url,
                model,
                ..
            } => {
                assert_eq!(api_url, DEFAULT_API_URL);
                assert_eq!(model, "llama3-70b-8192");
            }
            other => panic!("unexpected provider {:?}", other)
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(build_llm_provider(Provider::Ollama, &llm(None, None)).is_ok());
    }

    #[test]
    fn test_build_generator_for_ollama() {
        let mut config = llm(Some("ollama"), None);
        config.timeout_secs = 5;
        assert!(build_generator(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = LlmConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(generation_timeout(&config).is_err());
    }

    #[test]
    fn test_zero_max_rows_override_rejected() {
        let mut config = Config::default();
        let global = GlobalArgs {
            max_rows: Some(0),
            ..Default::default()
        };
        assert!(apply_global_overrides(&mut config, &global).is_err());
    }

    #[test]
    fn test_allowed_tables_override_replaces_list() {
        let mut config = Config::default();
        let global = GlobalArgs {
            allowed_tables: Some("Invoices, vendors".into()),
            ..Default::default()
        };
        apply_global_overrides(&mut config, &global).unwrap();
        let policy = config.security_policy().unwrap();
        assert_eq!(policy.allowlist.iter().collect::<Vec<_>>(), ["invoices", "vendors"]);
    }
}
