//! Cell decoding into transport-safe scalars.
//!
//! Date and time values become ISO-8601 strings, JSON columns stay JSON,
//! everything else becomes a JSON scalar of the matching kind. Rows arrive
//! in the binary wire format, so a type without a decoder here is refused
//! rather than read as text.

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde_json::{Number, Value};
use sqlx::{
    Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef,
    postgres::{
        PgRow, PgTypeInfo, PgTypeKind, PgValueFormat,
        types::{PgInterval, PgMoney, PgTimeTz}
    },
    types::Uuid
};
use tracing::warn;

use crate::error::QueryError;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decimal places of a MONEY value under the usual `lc_monetary`
const MONEY_SCALE: u32 = 2;

pub fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

pub fn time_value(time: NaiveTime) -> Value {
    Value::String(time.format("%H:%M:%S%.f").to_string())
}

/// TIMETZ as `HH:MM:SS[.f]+hh:mm`
pub fn time_tz_value(time: PgTimeTz) -> Value {
    Value::String(format!("{}{}", time.time.format("%H:%M:%S%.f"), time.offset))
}

pub fn datetime_value(datetime: NaiveDateTime) -> Value {
    Value::String(datetime.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub fn datetime_utc_value(datetime: DateTime<Utc>) -> Value {
    Value::String(datetime.to_rfc3339())
}

/// INTERVAL as an ISO-8601 duration such as `P1Y2M3DT4H5M6.5S`.
///
/// Postgres keeps months, days and microseconds apart, and so does this;
/// each component carries its own sign.
pub fn interval_value(interval: PgInterval) -> Value {
    let mut text = String::from("P");
    let date_parts = [
        (interval.months / 12, 'Y'),
        (interval.months % 12, 'M'),
        (interval.days, 'D')
    ];
    for (amount, unit) in date_parts {
        if amount != 0 {
            text.push_str(&format!("{}{}", amount, unit));
        }
    }

    let micros = interval.microseconds;
    if micros != 0 {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let hours = abs / 3_600_000_000;
        let minutes = abs / 60_000_000 % 60;
        let seconds = abs / 1_000_000 % 60;
        let fraction = abs % 1_000_000;

        text.push('T');
        if hours != 0 {
            text.push_str(&format!("{}{}H", sign, hours));
        }
        if minutes != 0 {
            text.push_str(&format!("{}{}M", sign, minutes));
        }
        if seconds != 0 || fraction != 0 {
            let secs = if fraction == 0 {
                seconds.to_string()
            } else {
                format!("{}.{:06}", seconds, fraction)
                    .trim_end_matches('0')
                    .to_string()
            };
            text.push_str(&format!("{}{}S", sign, secs));
        }
    }

    if text == "P" {
        text.push_str("T0S");
    }
    Value::String(text)
}

pub fn uuid_value(uuid: Uuid) -> Value {
    Value::String(uuid.to_string())
}

/// NUMERIC as a JSON number; falls back to its exact text when `f64`
/// cannot hold it.
pub fn decimal_value(decimal: Decimal) -> Value {
    decimal
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(decimal.to_string()))
}

/// Exact decimal text of a binary-format NUMERIC.
///
/// Covers what `rust_decimal` refuses: more than 28 significant digits,
/// `NaN` and the infinities. `None` for a malformed buffer.
pub fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |offset: usize| {
        bytes
            .get(offset..offset + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    };
    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    match sign {
        NUMERIC_POS | NUMERIC_NEG => {}
        NUMERIC_NAN => return Some(String::from("NaN")),
        NUMERIC_PINF => return Some(String::from("Infinity")),
        NUMERIC_NINF => return Some(String::from("-Infinity")),
        _ => return None
    }

    let digits: Vec<u16> = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<_>>()?;
    // Group `idx` holds base-10000 digit of weight `weight - idx`
    let group = |idx: i32| {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for idx in 1..=weight {
            text.push_str(&format!("{:04}", group(idx)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

fn float_value(float: f64) -> Value {
    Number::from_f64(float)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn decode_error(row: &PgRow, idx: usize, err: impl Display) -> QueryError {
    QueryError::Execution(format!(
        "could not decode column '{}': {}",
        row.column(idx).name(),
        err
    ))
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, QueryError>
where
    T: Decode<'r, Postgres> + Type<Postgres>
{
    row.try_get::<Option<T>, _>(idx)
        .map_err(|e| decode_error(row, idx, e))
}

fn map<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or(Value::Null)
}

/// Types whose binary send form is their text form
fn sent_as_text(type_info: &PgTypeInfo) -> bool {
    matches!(type_info.kind(), PgTypeKind::Enum(_))
        || matches!(type_info.name(), "CITEXT" | "XML" | "UNKNOWN")
}

/// NUMERIC that `rust_decimal` could not take, as exact text
fn numeric_fallback(row: &PgRow, idx: usize) -> Result<Value, QueryError> {
    let raw = row.try_get_raw(idx).map_err(|e| decode_error(row, idx, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let text = match raw.format() {
        PgValueFormat::Text => raw.as_str().ok().map(str::to_string),
        PgValueFormat::Binary => raw.as_bytes().ok().and_then(numeric_text)
    };
    text.map(Value::String)
        .ok_or_else(|| decode_error(row, idx, "malformed NUMERIC value"))
}

/// Label of an enum or other text-sent column; refuses binary-only types
fn text_fallback(row: &PgRow, idx: usize) -> Result<Value, QueryError> {
    let column = row.column(idx);
    let raw = row.try_get_raw(idx).map_err(|e| decode_error(row, idx, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if matches!(raw.format(), PgValueFormat::Text) || sent_as_text(column.type_info()) {
        let text = raw.as_str().map_err(|e| decode_error(row, idx, e))?;
        return Ok(Value::String(text.to_string()));
    }
    let type_name = column.type_info().name();
    warn!(column = column.name(), type_name, "unsupported column type");
    Err(QueryError::Execution(format!(
        "column '{}' has unsupported type {}",
        column.name(),
        type_name
    )))
}

/// Decode one cell by its Postgres type name
pub(super) fn decode_cell(row: &PgRow, idx: usize) -> Result<Value, QueryError> {
    let value = match row.column(idx).type_info().name() {
        "BOOL" => map(get::<bool>(row, idx)?, Value::Bool),
        "INT2" => map(get::<i16>(row, idx)?, Value::from),
        "INT4" => map(get::<i32>(row, idx)?, Value::from),
        "INT8" => map(get::<i64>(row, idx)?, Value::from),
        "OID" => map(get::<sqlx::postgres::types::Oid>(row, idx)?, |v| Value::from(v.0)),
        "FLOAT4" => map(get::<f32>(row, idx)?, |v| float_value(f64::from(v))),
        "FLOAT8" => map(get::<f64>(row, idx)?, float_value),
        "NUMERIC" => match row.try_get::<Option<Decimal>, _>(idx) {
            Ok(decimal) => map(decimal, decimal_value),
            Err(_) => numeric_fallback(row, idx)?
        },
        "MONEY" => map(get::<PgMoney>(row, idx)?, |m| {
            decimal_value(m.to_decimal(MONEY_SCALE))
        }),
        "DATE" => map(get::<NaiveDate>(row, idx)?, date_value),
        "TIME" => map(get::<NaiveTime>(row, idx)?, time_value),
        "TIMETZ" => map(get::<PgTimeTz>(row, idx)?, time_tz_value),
        "TIMESTAMP" => map(get::<NaiveDateTime>(row, idx)?, datetime_value),
        "TIMESTAMPTZ" => map(get::<DateTime<Utc>>(row, idx)?, datetime_utc_value),
        "INTERVAL" => map(get::<PgInterval>(row, idx)?, interval_value),
        "JSON" | "JSONB" => get::<Value>(row, idx)?.unwrap_or(Value::Null),
        "UUID" => map(get::<Uuid>(row, idx)?, uuid_value),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => {
            map(get::<String>(row, idx)?, Value::String)
        }
        _ => text_fallback(row, idx)?
    };
    Ok(value)
}

/// Decode every cell of a row, keyed by column name
pub(super) fn decode_row(row: &PgRow) -> Result<super::ResultRow, QueryError> {
    row.columns()
        .iter()
        .map(|column| Ok((column.name().to_string(), decode_cell(row, column.ordinal())?)))
        .collect()
}
