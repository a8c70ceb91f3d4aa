//! Process-wide security settings as explicit, immutable values.
//!
//! The gate and the executor receive these at construction time; nothing
//! here is global state, so tests can run several policies side by side.

use std::{fmt, num::NonZeroU32};

use compact_str::CompactString;
use indexmap::IndexSet;
use serde::Serialize;

use crate::gate::SecurityGate;

/// Tables permitted when nothing else is configured
pub const DEFAULT_ALLOWED_TABLES: [&str; 6] = [
    "invoices",
    "vendors",
    "customers",
    "categories",
    "line_items",
    "payments"
];

/// Row cap used when nothing else is configured
pub const DEFAULT_MAX_ROWS: u32 = 100;

/// Ordered set of lower-cased table names the gate lets through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TableAllowlist {
    tables: IndexSet<CompactString>
}

impl TableAllowlist {
    /// Build from table names. Names are trimmed and lower-cased, blanks
    /// are dropped, duplicates keep their first position.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>
    {
        let tables = tables
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(CompactString::from)
            .collect();
        Self {
            tables
        }
    }

    /// Parse a comma separated list such as `invoices, vendors`
    pub fn parse_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Membership test; `table` must already be lower-cased
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(CompactString::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Default for TableAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TABLES)
    }
}

impl fmt::Display for TableAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Upper bound on rows returned for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowCap(NonZeroU32);

impl RowCap {
    /// Returns `None` for zero
    pub fn new(rows: u32) -> Option<Self> {
        NonZeroU32::new(rows).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

impl Default for RowCap {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_MAX_ROWS).unwrap_or(NonZeroU32::MIN))
    }
}

impl fmt::Display for RowCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the gate and executor need to know about what is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub allowlist:    TableAllowlist,
    pub row_cap:      RowCap,
    /// Layer a full SQL parse behind the lexical checks
    pub strict_parse: bool
}

impl SecurityPolicy {
    pub fn gate(&self) -> SecurityGate {
        SecurityGate::new(self.allowlist.clone()).with_strict_parse(self.strict_parse)
    }
}
