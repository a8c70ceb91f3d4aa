//! Read-only, row-capped execution of vetted queries.
//!
//! # Row cap
//!
//! The cap is enforced twice:
//!
//! 1. If the vetted text has no `LIMIT` (or `FETCH FIRST`) clause,
//!    ` LIMIT <cap>` is appended.
//!    This is the only rewrite a vetted query ever gets; an existing limit is
//!    left exactly as written, larger or smaller.
//! 2. The store stops reading after `cap` rows, and [`QueryExecutor`] cuts
//!    anything beyond that again, whatever the text says.
//!
//! # Storage
//!
//! The store is a [`QueryStore`] trait object. [`PgStore`] runs each query
//! inside a transaction marked `READ ONLY` on a bounded `sqlx` pool, so a
//! mutating statement that slipped past the gate is refused by the engine
//! as well.
//! Column names come from the first row, or from describing the statement
//! when the result is empty.

mod postgres;
mod value;

use std::{borrow::Cow, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
pub use postgres::PgStore;
use serde::Serialize;
use tracing::debug;
pub use value::{
    date_value, datetime_utc_value, datetime_value, decimal_value, interval_value, numeric_text,
    time_tz_value, time_value, uuid_value
};

use crate::{
    error::QueryError,
    gate::{VettedQuery, words},
    policy::RowCap
};

/// Column name to scalar, in column order
pub type ResultRow = IndexMap<String, serde_json::Value>;

/// Rows of one query sharing one column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns:   Vec<String>,
    pub rows:      Vec<ResultRow>,
    /// The store had more rows than the cap allowed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Storage boundary: runs exactly one statement read-only.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Execute `sql` in a read-only transaction and return at most
    /// `max_rows` rows. Storage failures come back as
    /// [`QueryError::Execution`] carrying the store's message.
    async fn fetch(&self, sql: &str, max_rows: RowCap) -> Result<ResultSet, QueryError>;
}

/// Keywords that already bound the row count
const LIMIT_KEYWORDS: [&str; 2] = ["LIMIT", "FETCH"];

/// Append ` LIMIT <cap>` unless the text already has a `LIMIT` or `FETCH`
/// keyword.
///
/// # Example
///
/// ```
/// use sql_query_gate::{executor::apply_row_limit, policy::RowCap};
///
/// let cap = RowCap::new(100).unwrap();
/// assert_eq!(
///     apply_row_limit("SELECT * FROM invoices", cap),
///     "SELECT * FROM invoices LIMIT 100"
/// );
/// assert_eq!(
///     apply_row_limit("SELECT * FROM invoices LIMIT 5", cap),
///     "SELECT * FROM invoices LIMIT 5"
/// );
/// ```
pub fn apply_row_limit(sql: &str, cap: RowCap) -> Cow<'_, str> {
    if words(sql).any(|w| LIMIT_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k))) {
        Cow::Borrowed(sql)
    } else {
        Cow::Owned(format!("{} LIMIT {}", sql.trim_end(), cap))
    }
}

/// What actually ran and what came back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedQuery {
    pub sql:    String,
    pub result: ResultSet
}

/// Runs vetted queries against a store under a fixed row cap.
#[derive(Clone)]
pub struct QueryExecutor {
    store:   Arc<dyn QueryStore>,
    row_cap: RowCap
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn QueryStore>, row_cap: RowCap) -> Self {
        Self {
            store,
            row_cap
        }
    }

    pub fn row_cap(&self) -> RowCap {
        self.row_cap
    }

    /// Run a vetted query. Errors are returned as-is, never retried.
    pub async fn execute(&self, vetted: &VettedQuery) -> Result<ExecutedQuery, QueryError> {
        let sql = apply_row_limit(vetted.sql(), self.row_cap);
        let mut result = self.store.fetch(&sql, self.row_cap).await?;
        if result.rows.len() > self.row_cap.as_usize() {
            debug!(
                returned = result.rows.len(),
                cap = self.row_cap.get(),
                "store exceeded row cap, truncating"
            );
            result.rows.truncate(self.row_cap.as_usize());
            result.truncated = true;
        }
        Ok(ExecutedQuery {
            sql: sql.into_owned(),
            result
        })
    }
}
