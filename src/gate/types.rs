//! Type definitions for the security gate.
//!
//! - [`CandidateQuery`] - unvetted SQL tagged with its producer
//! - [`VettedQuery`] - SQL that passed every check; only the gate builds one
//! - [`Rejection`] - why a candidate was refused
//! - [`Verdict`] - outcome of a single `vet` call

use std::fmt;

use serde::Serialize;

/// Which component produced a candidate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    /// Text-generation service
    Generated,
    /// Pre-authored fallback template
    Fallback
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Fallback => write!(f, "fallback")
        }
    }
}

/// An unvetted SQL string. Consumed exactly once by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    sql:    String,
    source: QuerySource
}

impl CandidateQuery {
    pub fn new(sql: impl Into<String>, source: QuerySource) -> Self {
        Self {
            sql: sql.into(),
            source
        }
    }

    pub fn generated(sql: impl Into<String>) -> Self {
        Self::new(sql, QuerySource::Generated)
    }

    pub fn fallback(sql: impl Into<String>) -> Self {
        Self::new(sql, QuerySource::Fallback)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn source(&self) -> QuerySource {
        self.source
    }
}

/// A candidate that passed the gate, text unchanged.
///
/// There is no public constructor: the executor only takes `&VettedQuery`,
/// so nothing reaches the store without going through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VettedQuery {
    sql:    String,
    source: QuerySource
}

impl VettedQuery {
    pub(super) fn new(sql: String, source: QuerySource) -> Self {
        Self {
            sql,
            source
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn source(&self) -> QuerySource {
        self.source
    }
}

/// Identifies which gate check produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateCheck {
    StatementType,
    StatementSeparator,
    KeywordDenylist,
    TableAllowlist,
    StrictParse
}

impl GateCheck {
    pub fn id(self) -> &'static str {
        match self {
            Self::StatementType => "GATE001",
            Self::StatementSeparator => "GATE002",
            Self::KeywordDenylist => "GATE003",
            Self::TableAllowlist => "GATE004",
            Self::StrictParse => "GATE005"
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StatementType => "Statement type",
            Self::StatementSeparator => "Statement separator",
            Self::KeywordDenylist => "Keyword denylist",
            Self::TableAllowlist => "Table allowlist",
            Self::StrictParse => "Strict parse"
        }
    }
}

/// Reason a candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Does not start with the `SELECT` keyword (includes empty input)
    NotSelect,
    /// A `;` appears somewhere in the text
    StatementSeparator,
    /// A mutating or DDL keyword appears as a whole token
    ForbiddenKeyword { keyword: &'static str },
    /// A `FROM`/`JOIN` target is outside the allowlist
    TableNotAllowed { table: String, allowed: Vec<String> },
    /// Strict mode only: the parser refused the text
    Unparseable { message: String },
    /// Strict mode only: parsed, but not exactly one query statement
    NotSingleQuery
}

impl Rejection {
    pub fn check(&self) -> GateCheck {
        match self {
            Self::NotSelect => GateCheck::StatementType,
            Self::StatementSeparator => GateCheck::StatementSeparator,
            Self::ForbiddenKeyword {
                ..
            } => GateCheck::KeywordDenylist,
            Self::TableNotAllowed {
                ..
            } => GateCheck::TableAllowlist,
            Self::Unparseable {
                ..
            }
            | Self::NotSingleQuery => GateCheck::StrictParse
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSelect => write!(f, "Only SELECT queries are allowed (not a read query)"),
            Self::StatementSeparator => {
                write!(f, "Semicolons are not allowed (statement separator present)")
            }
            Self::ForbiddenKeyword {
                keyword
            } => write!(f, "Keyword '{}' is not allowed", keyword),
            Self::TableNotAllowed {
                table,
                allowed
            } => write!(
                f,
                "Table '{}' is not in the allowed list: [{}]",
                table,
                allowed.join(", ")
            ),
            Self::Unparseable {
                message
            } => write!(f, "Query could not be parsed: {}", message),
            Self::NotSingleQuery => write!(f, "Query must be exactly one SELECT statement")
        }
    }
}

impl std::error::Error for Rejection {}

/// Outcome of vetting one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(VettedQuery),
    Rejected(Rejection)
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection)
        }
    }

    pub fn into_result(self) -> Result<VettedQuery, Rejection> {
        match self {
            Self::Accepted(vetted) => Ok(vetted),
            Self::Rejected(rejection) => Err(rejection)
        }
    }
}
