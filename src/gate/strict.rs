use sqlparser::{ast::Statement, dialect::PostgreSqlDialect, parser::Parser};

use super::types::Rejection;

/// Optional second pass: the text must parse to exactly one query.
///
/// Only ever runs after the lexical checks accepted the text, so it can add
/// rejections but never remove one.
pub(super) fn single_query(sql: &str) -> Result<(), Rejection> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
        Rejection::Unparseable {
            message: e.to_string()
        }
    })?;
    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        _ => Err(Rejection::NotSingleQuery)
    }
}
