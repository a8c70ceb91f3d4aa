//! Security gate for externally sourced SQL.
//!
//! A pure function from a candidate SQL string to a [`Verdict`]. Checks run
//! in a fixed order and the first failure wins:
//!
//! | ID | Check | Rejects when |
//! |----|-------|--------------|
//! | GATE001 | Statement type | text does not open with the `SELECT` keyword |
//! | GATE002 | Statement separator | a `;` appears anywhere |
//! | GATE003 | Keyword denylist | `DROP`, `DELETE`, `INSERT`, `UPDATE`, `ALTER`, `CREATE`, `TRUNCATE`, `EXEC` or `EXECUTE` appears as a whole token |
//! | GATE004 | Table allowlist | a `FROM`/`JOIN` target or `FROM` list item is not allowlisted |
//! | GATE005 | Strict parse | (opt-in) the text is not exactly one parsable query |
//!
//! The checks are lexical. They over-reject on purpose (a `;` inside a string
//! literal, `EXTRACT(YEAR FROM col)`), and the row cap enforced by the
//! executor and the read-only transaction do not depend on the gate being
//! right.
//!
//! # Example
//!
//! ```
//! use sql_query_gate::{gate::vet, policy::TableAllowlist};
//!
//! let allowlist = TableAllowlist::new(["invoices", "vendors"]);
//!
//! assert!(vet("SELECT * FROM invoices", &allowlist).is_accepted());
//! assert!(!vet("SELECT * FROM users", &allowlist).is_accepted());
//! assert!(!vet("SELECT 1; DROP TABLE invoices", &allowlist).is_accepted());
//! ```

mod checks;
mod strict;
mod types;

pub use checks::{DENIED_KEYWORDS, referenced_tables};
pub(crate) use checks::words;
pub use types::{CandidateQuery, GateCheck, QuerySource, Rejection, Verdict, VettedQuery};

use crate::policy::TableAllowlist;

/// Vet a generated query with the lexical checks only.
pub fn vet(sql: &str, allowlist: &TableAllowlist) -> Verdict {
    vet_candidate(&CandidateQuery::generated(sql), allowlist, false)
}

fn vet_candidate(candidate: &CandidateQuery, allowlist: &TableAllowlist, strict: bool) -> Verdict {
    let sql = candidate.sql();
    let outcome = checks::statement_type(sql)
        .and_then(|()| checks::statement_separator(sql))
        .and_then(|()| checks::keyword_denylist(sql))
        .and_then(|()| checks::table_allowlist(sql, allowlist))
        .and_then(|()| {
            if strict {
                strict::single_query(sql)
            } else {
                Ok(())
            }
        });
    match outcome {
        Ok(()) => Verdict::Accepted(VettedQuery::new(sql.to_string(), candidate.source())),
        Err(rejection) => Verdict::Rejected(rejection)
    }
}

/// Gate bound to one allowlist, built once from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityGate {
    allowlist:    TableAllowlist,
    strict_parse: bool
}

impl SecurityGate {
    pub fn new(allowlist: TableAllowlist) -> Self {
        Self {
            allowlist,
            strict_parse: false
        }
    }

    /// Enable the parser pass behind the lexical checks
    pub fn with_strict_parse(mut self, strict_parse: bool) -> Self {
        self.strict_parse = strict_parse;
        self
    }

    pub fn allowlist(&self) -> &TableAllowlist {
        &self.allowlist
    }

    pub fn is_strict(&self) -> bool {
        self.strict_parse
    }

    /// Vet raw SQL as if it came from the generator
    pub fn vet(&self, sql: &str) -> Verdict {
        self.vet_candidate(&CandidateQuery::generated(sql))
    }

    pub fn vet_candidate(&self, candidate: &CandidateQuery) -> Verdict {
        vet_candidate(candidate, &self.allowlist, self.strict_parse)
    }
}
