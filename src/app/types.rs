//! Application types for CLI commands.
//!
//! Command parameters flow in from the parsed command line; every command
//! hands back a [`CommandOutput`] so the binary only has to print and exit.

use crate::cli::Provider;

/// Parameters for the ask command.
///
/// # Example
///
/// ```
/// use sql_query_gate::{app::AskParams, cli::Provider};
///
/// let params = AskParams {
///     question:    "top vendors by spend".to_string(),
///     provider:    Some(Provider::Ollama),
///     api_key:     None,
///     model:       None,
///     no_progress: true
/// };
/// ```
#[derive(Debug, Clone)]
pub struct AskParams {
    /// Question text, or "-" to read it from stdin.
    pub question:    String,
    /// Overrides the configured provider.
    pub provider:    Option<Provider>,
    /// Overrides the configured API key.
    pub api_key:     Option<String>,
    /// Overrides the configured model.
    pub model:       Option<String>,
    pub no_progress: bool
}

/// Rendered result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Text for stdout
    pub stdout:    String,
    /// Text for stderr
    pub stderr:    String
}

impl CommandOutput {
    pub fn success(stdout: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr: String::new()
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// A failure whose report goes to stderr
    pub fn failure(exit_code: i32, stderr: String) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr
        }
    }
}
