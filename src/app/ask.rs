//! The ask command: question in, rows out.

use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::error;

use super::{
    helpers::{apply_ask_overrides, build_pipeline, read_input},
    types::{AskParams, CommandOutput}
};
use crate::{
    config::Config,
    error::{AppResult, QueryError},
    executor::{PgStore, QueryStore},
    output::{OutputFormat, OutputOptions, format_query_error, format_response}
};

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run the ask command against the configured PostgreSQL database.
///
/// The connection pool is created lazily, so configuration mistakes in the
/// URL surface here while an unreachable server surfaces as an execution
/// error of the request.
pub async fn run_ask(
    params: AskParams,
    config: Config,
    opts: &OutputOptions
) -> AppResult<CommandOutput> {
    let store = PgStore::connect_lazy(&config.database)?;
    run_ask_with_store(params, config, Arc::new(store), opts).await
}

/// Run the ask command against any store.
pub async fn run_ask_with_store(
    params: AskParams,
    mut config: Config,
    store: Arc<dyn QueryStore>,
    opts: &OutputOptions
) -> AppResult<CommandOutput> {
    let question = read_input(&params.question)?;
    apply_ask_overrides(&mut config, &params);
    let pipeline = build_pipeline(&config, store)?;

    let pb = (!params.no_progress).then(|| spinner("Answering question..."));
    let result = pipeline.run(&question).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    match result {
        Ok(response) => Ok(CommandOutput::success(format_response(&response, opts)?)),
        Err(err) => Ok(failure_output(&err, opts))
    }
}

fn failure_output(err: &QueryError, opts: &OutputOptions) -> CommandOutput {
    if let QueryError::Internal(detail) = err {
        error!(detail = %detail, "internal error while answering question");
    }
    let report = format_query_error(err, opts);
    match opts.format {
        OutputFormat::Text => CommandOutput::failure(err.exit_code(), report),
        OutputFormat::Json | OutputFormat::Yaml => {
            CommandOutput::success(report).with_exit_code(err.exit_code())
        }
    }
}
