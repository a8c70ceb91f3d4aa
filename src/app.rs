//! Application logic for the SQL Query Gate CLI.
//!
//! Command implementations live here, separated from the binary entry point
//! so they can be tested. Every command returns a
//! [`CommandOutput`] instead of printing.

mod ask;
mod helpers;
mod inspect;
mod types;

pub use ask::{run_ask, run_ask_with_store};
pub use helpers::{
    apply_ask_overrides, apply_global_overrides, build_generator, build_llm_provider,
    build_pipeline, convert_format, create_output_options, effective_model, generation_timeout,
    read_input, resolve_provider
};
pub use inspect::{run_status, run_templates, run_vet};
pub use types::{AskParams, CommandOutput};

use crate::{
    cli::{Cli, Commands},
    config::Config,
    error::AppResult
};

/// Load configuration for a parsed command line.
///
/// An explicit `--config` file replaces the default file locations;
/// environment variables and command-line flags are applied on top either
/// way.
pub fn load_config(cli: &Cli) -> AppResult<Config> {
    let mut config = match &cli.global.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?
    };
    apply_global_overrides(&mut config, &cli.global)?;
    Ok(config)
}

/// Run one parsed command line.
pub async fn run(cli: Cli) -> AppResult<CommandOutput> {
    let config = load_config(&cli)?;
    let opts = create_output_options(&cli.global);

    match cli.command {
        Commands::Ask {
            question,
            provider,
            api_key,
            model,
            no_progress
        } => {
            let params = AskParams {
                question,
                provider,
                api_key,
                model,
                no_progress
            };
            run_ask(params, config, &opts).await
        }
        Commands::Vet {
            sql
        } => run_vet(&sql, &config, &opts),
        Commands::Templates => run_templates(&config, &opts),
        Commands::Status => run_status(&config, &opts)
    }
}
