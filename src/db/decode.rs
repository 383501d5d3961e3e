//! Row decoding
//!
//! Each cell is decoded according to the type the engine reports for the
//! value. DECIMAL/NUMERIC goes through `rust_decimal` and is coerced to f64.
//! Types without a dedicated mapping fall back to text, then to raw bytes.

use crate::execution::CellValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

type DecodeResult = Result<CellValue, sqlx::Error>;

fn decimal_to_float(d: Decimal) -> CellValue {
    d.to_f64().map(CellValue::Float).unwrap_or(CellValue::Text(d.to_string()))
}

/// Last resort for types without a dedicated mapping: text, then bytes, then the
/// type name. Never fails, so an unusual column cannot turn a correct query into
/// an execution error.
fn untyped_cell<R>(row: &R, idx: usize, type_name: &str) -> CellValue
where
    R: Row,
    for<'r> String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    for<'r> Vec<u8>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    usize: sqlx::ColumnIndex<R>,
{
    if let Ok(s) = row.try_get::<String, _>(idx) {
        return CellValue::Text(s);
    }
    match row.try_get::<Vec<u8>, _>(idx) {
        Ok(bytes) => bytes_cell(bytes),
        Err(_) => placeholder(type_name),
    }
}

fn bytes_cell(bytes: Vec<u8>) -> CellValue {
    match String::from_utf8(bytes) {
        Ok(s) => CellValue::Text(s),
        Err(e) => CellValue::Bytes(e.into_bytes()),
    }
}

fn placeholder(type_name: &str) -> CellValue {
    CellValue::Text(format!("<{}>", type_name))
}

pub fn mysql_cell(row: &MySqlRow, idx: usize) -> DecodeResult {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).map(CellValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row.try_get::<i64, _>(idx).map(CellValue::Int),
        t if t.ends_with("UNSIGNED") => row.try_get::<u64, _>(idx).map(|v| {
            i64::try_from(v).map(CellValue::Int).unwrap_or(CellValue::Float(v as f64))
        }),
        "FLOAT" => row.try_get::<f32, _>(idx).map(|v| CellValue::Float(v as f64)),
        "DOUBLE" => row.try_get::<f64, _>(idx).map(CellValue::Float),
        "DECIMAL" => row.try_get::<Decimal, _>(idx).map(decimal_to_float),
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(CellValue::Date),
        "TIME" => row.try_get::<NaiveTime, _>(idx).map(|t| CellValue::Text(t.to_string())),
        "DATETIME" => row.try_get::<NaiveDateTime, _>(idx).map(CellValue::DateTime),
        "TIMESTAMP" => row.try_get::<DateTime<Utc>, _>(idx).map(CellValue::Timestamp),
        "JSON" => row.try_get::<serde_json::Value, _>(idx).map(CellValue::Json),
        // YEAR, BIT, SET, ENUM, GEOMETRY and the like
        _ => Ok(untyped_cell(row, idx, &type_name)),
    }
}

pub fn pg_cell(row: &PgRow, idx: usize) -> DecodeResult {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(CellValue::Bool),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| CellValue::Int(v as i64)),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| CellValue::Int(v as i64)),
        "INT8" => row.try_get::<i64, _>(idx).map(CellValue::Int),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| CellValue::Float(v as f64)),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(CellValue::Float),
        "NUMERIC" => row.try_get::<Decimal, _>(idx).map(decimal_to_float),
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(CellValue::Date),
        "TIME" => row.try_get::<NaiveTime, _>(idx).map(|t| CellValue::Text(t.to_string())),
        "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(idx).map(CellValue::DateTime),
        "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(idx).map(CellValue::Timestamp),
        "UUID" => row.try_get::<uuid::Uuid, _>(idx).map(|u| CellValue::Text(u.to_string())),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(idx).map(CellValue::Json),
        "BYTEA" => row.try_get::<Vec<u8>, _>(idx).map(CellValue::Bytes),
        // arrays, intervals, ranges and the like are reported by type name only
        _ => Ok(untyped_cell(row, idx, &type_name)),
    }
}

pub fn sqlite_cell(row: &SqliteRow, idx: usize) -> DecodeResult {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_uppercase();

    match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).map(CellValue::Bool),
        "INTEGER" | "INT8" | "BIGINT" => row.try_get::<i64, _>(idx).map(CellValue::Int),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(idx).map(CellValue::Float),
        "BLOB" => row.try_get::<Vec<u8>, _>(idx).map(CellValue::Bytes),
        _ => Ok(untyped_cell(row, idx, &type_name)),
    }
}
