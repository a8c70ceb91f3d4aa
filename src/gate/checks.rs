//! The lexical checks, one function per check.
//!
//! All of them work on raw text: no tokenizer beyond splitting on
//! non-identifier characters, no awareness of string literals or comments.

use std::sync::LazyLock;

use regex::Regex;
use smallvec::SmallVec;

use super::types::Rejection;
use crate::policy::TableAllowlist;

/// Mutating and DDL keywords refused anywhere in the text
pub const DENIED_KEYWORDS: [&str; 9] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE"
];

const QUOTED: &str = r#""(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]"#;

const IDENT: &str = r#""(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*"#;

/// `FROM`/`JOIN` followed by a possibly quoted, possibly dotted name. A
/// quoted name may sit directly against the keyword (`FROM"users"`).
static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:FROM|JOIN)((?:\s+(?:{ident})|\s*(?:{quoted}))(?:\s*\.\s*(?:{ident}))*)",
        ident = IDENT,
        quoted = QUOTED
    ))
    .expect("table reference pattern is valid")
});

/// Optional alias, a comma, then the next item of a `FROM` list
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:AS\s+)?(?:(?:{ident})\s*)?,\s*((?:{ident})(?:\s*\.\s*(?:{ident}))*)",
        ident = IDENT
    ))
    .expect("list item pattern is valid")
});

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENT).expect("identifier pattern is valid"));

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Identifier-like tokens of the text, in order
pub(crate) fn words(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| !is_word_char(c)).filter(|w| !w.is_empty())
}

/// Check 1: text must open with the `SELECT` keyword
pub(super) fn statement_type(sql: &str) -> Result<(), Rejection> {
    match words(sql.trim()).next() {
        Some(first) if first.eq_ignore_ascii_case("SELECT") && sql.trim().starts_with(first) => {
            Ok(())
        }
        _ => Err(Rejection::NotSelect)
    }
}

/// Check 2: no statement separator anywhere
pub(super) fn statement_separator(sql: &str) -> Result<(), Rejection> {
    if sql.contains(';') {
        Err(Rejection::StatementSeparator)
    } else {
        Ok(())
    }
}

/// Check 3: no denied keyword as a whole token
///
/// When several are present, the one listed first in [`DENIED_KEYWORDS`]
/// is reported.
pub(super) fn keyword_denylist(sql: &str) -> Result<(), Rejection> {
    let found: SmallVec<[&'static str; 4]> = DENIED_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| words(sql).any(|w| w.eq_ignore_ascii_case(keyword)))
        .collect();
    match found.first() {
        Some(&keyword) => Err(Rejection::ForbiddenKeyword {
            keyword
        }),
        None => Ok(())
    }
}

/// Check 4: every `FROM`/`JOIN` target is allowlisted
pub(super) fn table_allowlist(sql: &str, allowlist: &TableAllowlist) -> Result<(), Rejection> {
    for table in referenced_tables(sql) {
        if !allowlist.contains(&table) {
            return Err(Rejection::TableNotAllowed {
                table,
                allowed: allowlist.iter().map(str::to_string).collect()
            });
        }
    }
    Ok(())
}

/// Table names following `FROM` or `JOIN`, plus every further item of a
/// comma separated `FROM` list. Unquoted, last dotted segment only,
/// lower-cased, in order of appearance.
pub fn referenced_tables(sql: &str) -> SmallVec<[String; 4]> {
    let mut tables = SmallVec::new();
    for caps in TABLE_REF.captures_iter(sql) {
        let Some(reference) = caps.get(1) else {
            continue;
        };
        tables.extend(table_name(reference.as_str()));
        let mut rest = &sql[reference.end()..];
        while let Some(item) = LIST_ITEM.captures(rest).and_then(|c| c.get(1)) {
            tables.extend(table_name(item.as_str()));
            rest = &rest[item.end()..];
        }
    }
    tables
}

fn table_name(reference: &str) -> Option<String> {
    SEGMENT
        .find_iter(reference)
        .last()
        .map(|segment| unquote(segment.as_str()).to_lowercase())
}

fn unquote(segment: &str) -> String {
    let inner = |open: char, close: char| {
        segment
            .strip_prefix(open)
            .and_then(|s| s.strip_suffix(close))
    };
    if let Some(name) = inner('"', '"') {
        name.replace("\"\"", "\"")
    } else if let Some(name) = inner('`', '`').or_else(|| inner('[', ']')) {
        name.to_string()
    } else {
        segment.to_string()
    }
}
