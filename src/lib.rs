//! # SQL Query Gate Library
//!
//! Turns natural-language questions into SQL, vets the SQL and runs it
//! read-only.
//!
//! # Modules
//!
//! - [`pipeline`] - Orchestrates generation, fallback, vetting and execution
//! - [`llm`] - SQL generation through OpenAI-compatible, Anthropic or Ollama
//!   APIs
//! - [`fallback`] - Pre-authored templates for common questions
//! - [`gate`] - Lexical security gate with an optional strict parse layer
//! - [`executor`] - Read-only, row-capped execution on PostgreSQL
//! - [`policy`] - Table allowlist and row cap
//! - [`config`] - Configuration loading
//! - [`output`] - Result formatting
//! - [`error`] - Error types and constructors

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod gate;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod policy;
