//! Row decoding into JSON-safe values.
//!
//! Timestamps become ISO-8601 strings, identifiers and decimals strings, binary data base64.
//! A column whose type cannot be decoded falls back to its text form, then to null.

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use datalink_core::DataRow;
use serde_json::{Number, Value};
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::types::Decimal;
use sqlx::{Column, Database, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::debug;

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn get<'r, DB, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    DB: Database,
    R: Row<Database = DB>,
    T: Decode<'r, DB> + Type<DB>,
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn naive_timestamp(v: NaiveDateTime) -> Value {
    Value::String(v.format(NAIVE_FORMAT).to_string())
}

fn bytes(v: Vec<u8>) -> Value {
    Value::String(base64::engine::general_purpose::STANDARD.encode(v))
}

fn is_null<R: Row>(row: &R, idx: usize) -> bool
where
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get_raw(idx).map(|raw| raw.is_null()).unwrap_or(true)
}

pub fn pg_row_to_json(row: &PgRow) -> DataRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = if is_null(row, idx) {
                Value::Null
            } else {
                pg_value(row, idx, column.type_info().name())
            };
            (column.name().to_string(), value)
        })
        .collect()
}

fn pg_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    let value = match type_name {
        "BOOL" => get::<Postgres, _, bool>(row, idx).map(Value::Bool),
        "INT2" => get::<Postgres, _, i16>(row, idx).map(Value::from),
        "INT4" => get::<Postgres, _, i32>(row, idx).map(Value::from),
        "INT8" => get::<Postgres, _, i64>(row, idx).map(Value::from),
        "OID" => get::<Postgres, _, sqlx::postgres::types::Oid>(row, idx).map(|o| Value::from(o.0)),
        "FLOAT4" => get::<Postgres, _, f32>(row, idx).map(|v| float(v as f64)),
        "FLOAT8" => get::<Postgres, _, f64>(row, idx).map(float),
        "NUMERIC" => get::<Postgres, _, Decimal>(row, idx).map(|d| Value::String(d.to_string())),
        "TIMESTAMP" => get::<Postgres, _, NaiveDateTime>(row, idx).map(naive_timestamp),
        "TIMESTAMPTZ" => {
            get::<Postgres, _, DateTime<Utc>>(row, idx).map(|v| Value::String(v.to_rfc3339()))
        }
        "DATE" => get::<Postgres, _, NaiveDate>(row, idx).map(|v| Value::String(v.to_string())),
        "TIME" => get::<Postgres, _, NaiveTime>(row, idx).map(|v| Value::String(v.to_string())),
        "UUID" => get::<Postgres, _, uuid::Uuid>(row, idx).map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => get::<Postgres, _, Value>(row, idx),
        "BYTEA" => get::<Postgres, _, Vec<u8>>(row, idx).map(bytes),
        "TEXT[]" | "VARCHAR[]" => {
            get::<Postgres, _, Vec<String>>(row, idx).map(|v| Value::from(v))
        }
        "INT4[]" => get::<Postgres, _, Vec<i32>>(row, idx).map(Value::from),
        "INT8[]" => get::<Postgres, _, Vec<i64>>(row, idx).map(Value::from),
        _ => None,
    };

    value
        .or_else(|| get::<Postgres, _, String>(row, idx).map(Value::String))
        .unwrap_or_else(|| {
            debug!("Unsupported PostgreSQL type {} at column {}", type_name, idx);
            Value::Null
        })
}

pub fn mysql_row_to_json(row: &MySqlRow) -> DataRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = if is_null(row, idx) {
                Value::Null
            } else {
                mysql_value(row, idx, column.type_info().name())
            };
            (column.name().to_string(), value)
        })
        .collect()
}

fn mysql_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    let value = match type_name {
        "BOOLEAN" => get::<MySql, _, bool>(row, idx).map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            get::<MySql, _, i64>(row, idx).map(Value::from)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => get::<MySql, _, u64>(row, idx).map(Value::from),
        "FLOAT" => get::<MySql, _, f32>(row, idx).map(|v| float(v as f64)),
        "DOUBLE" => get::<MySql, _, f64>(row, idx).map(float),
        "DECIMAL" => get::<MySql, _, Decimal>(row, idx).map(|d| Value::String(d.to_string())),
        "DATETIME" => get::<MySql, _, NaiveDateTime>(row, idx).map(naive_timestamp),
        "TIMESTAMP" => {
            get::<MySql, _, DateTime<Utc>>(row, idx).map(|v| Value::String(v.to_rfc3339()))
        }
        "DATE" => get::<MySql, _, NaiveDate>(row, idx).map(|v| Value::String(v.to_string())),
        "TIME" => get::<MySql, _, NaiveTime>(row, idx).map(|v| Value::String(v.to_string())),
        "JSON" => get::<MySql, _, Value>(row, idx),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            get::<MySql, _, Vec<u8>>(row, idx).map(bytes)
        }
        _ => None,
    };

    value
        .or_else(|| get::<MySql, _, String>(row, idx).map(Value::String))
        .unwrap_or_else(|| {
            debug!("Unsupported MySQL type {} at column {}", type_name, idx);
            Value::Null
        })
}

pub fn sqlite_row_to_json(row: &SqliteRow) -> DataRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            // storage class of the value, not the declared column type
            let runtime = row
                .try_get_raw(idx)
                .ok()
                .filter(|raw| !raw.is_null())
                .map(|raw| raw.type_info().name().to_string());
            let value = match runtime {
                None => Value::Null,
                Some(type_name) => sqlite_value(row, idx, &type_name),
            };
            (column.name().to_string(), value)
        })
        .collect()
}

fn sqlite_value(row: &SqliteRow, idx: usize, type_name: &str) -> Value {
    let value = match type_name {
        "INTEGER" => get::<Sqlite, _, i64>(row, idx).map(Value::from),
        "REAL" => get::<Sqlite, _, f64>(row, idx).map(float),
        "BOOLEAN" => get::<Sqlite, _, bool>(row, idx).map(Value::Bool),
        "BLOB" => get::<Sqlite, _, Vec<u8>>(row, idx).map(bytes),
        _ => None,
    };

    value
        .or_else(|| get::<Sqlite, _, String>(row, idx).map(Value::String))
        .unwrap_or(Value::Null)
}
