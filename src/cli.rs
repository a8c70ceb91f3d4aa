use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// SQL Query Gate - Answer questions about invoice data with vetted,
/// read-only SQL
#[derive(Parser, Debug)]
#[command(name = "sql-query-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands
}

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Read configuration from this file instead of the default locations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text", global = true)]
    pub output_format: Format,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Comma separated table allowlist, replaces the configured one
    #[arg(long, global = true, value_name = "TABLES")]
    pub allowed_tables: Option<String>,

    /// Maximum rows returned for one question
    #[arg(long, global = true, value_name = "ROWS")]
    pub max_rows: Option<u32>,

    /// Never answer from fallback templates
    #[arg(long, global = true)]
    pub no_fallback: bool,

    /// Additionally require the SQL to parse as exactly one query
    #[arg(long, global = true)]
    pub strict: bool
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn a question into SQL, vet it and run it
    Ask {
        /// Natural-language question (use - for stdin)
        question: String,

        /// LLM provider to use
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,

        /// API key for hosted providers
        #[arg(short, long, env = "LLM_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Hide the spinner
        #[arg(long)]
        no_progress: bool
    },

    /// Run only the security gate on a SQL string
    Vet {
        /// SQL to check (use - for stdin)
        sql: String
    },

    /// List fallback templates and check each against the gate
    Templates,

    /// Show what is configured, without touching the network
    Status
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// Any OpenAI-compatible endpoint, Groq by default
    #[value(name = "openai", alias = "groq")]
    OpenAI,
    Anthropic,
    Ollama
}

impl Provider {
    /// Get default model for provider
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAI => "llama3-70b-8192",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Ollama => "llama3.2"
        }
    }

    /// Name as written on the command line and in configuration
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama"
        }
    }

    /// Parse a provider name from configuration
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
    Yaml
}
