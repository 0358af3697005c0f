//! Dynamically typed column values.
//!
//! Rows flow through the pipeline as maps of [`PgValue`], a tagged union of
//! the driver's native types. The emitters dispatch on the tag; the direct
//! executor binds values back as query parameters, encoding according to the
//! parameter type the target statement expects.

use base64::Engine as _;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A single column value read from PostgreSQL.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    /// A native JSON document, seen only when a query projects a json/jsonb
    /// column without the textual cast (e.g. a hand-written root query).
    Json(serde_json::Value),
}

impl PgValue {
    /// Read one column of a row into a value, dispatching on the column's
    /// declared type.
    pub fn from_row(row: &Row, index: usize) -> Result<PgValue> {
        let column = &row.columns()[index];
        let pg_type = column.type_();

        let unsupported = |e: tokio_postgres::Error| {
            Error::Row(format!(
                "failed to read column '{}' (type {}): {e}",
                column.name(),
                column.type_()
            ))
        };

        match *pg_type {
            Type::BOOL => Ok(row
                .try_get::<_, Option<bool>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Bool)),
            Type::INT2 => Ok(row
                .try_get::<_, Option<i16>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, |i| PgValue::Int(i64::from(i)))),
            Type::INT4 => Ok(row
                .try_get::<_, Option<i32>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, |i| PgValue::Int(i64::from(i)))),
            Type::INT8 => Ok(row
                .try_get::<_, Option<i64>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Int)),
            Type::FLOAT4 => Ok(row
                .try_get::<_, Option<f32>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, |f| PgValue::Float(f64::from(f)))),
            Type::FLOAT8 => Ok(row
                .try_get::<_, Option<f64>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Float)),
            Type::NUMERIC => Ok(row
                .try_get::<_, Option<Decimal>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Decimal)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Ok(row
                .try_get::<_, Option<String>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Text)),
            Type::BYTEA => Ok(row
                .try_get::<_, Option<Vec<u8>>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Bytes)),
            Type::TIMESTAMP => Ok(row
                .try_get::<_, Option<NaiveDateTime>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, |ts| {
                    PgValue::Timestamp(DateTime::from_naive_utc_and_offset(ts, Utc))
                })),
            Type::TIMESTAMPTZ => Ok(row
                .try_get::<_, Option<DateTime<Utc>>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Timestamp)),
            Type::DATE => Ok(row
                .try_get::<_, Option<NaiveDate>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Date)),
            Type::TIME => Ok(row
                .try_get::<_, Option<NaiveTime>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Time)),
            Type::JSON | Type::JSONB => Ok(row
                .try_get::<_, Option<serde_json::Value>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Json)),
            Type::UUID => Ok(row
                .try_get::<_, Option<Uuid>>(index)
                .map_err(unsupported)?
                .map_or(PgValue::Null, PgValue::Uuid)),
            _ => match row.try_get::<_, Option<String>>(index) {
                Ok(v) => Ok(v.map_or(PgValue::Null, PgValue::Text)),
                Err(_) => Err(Error::Row(format!(
                    "unsupported column type {} for column '{}'",
                    column.type_(),
                    column.name()
                ))),
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    /// Canonical textual rendering used for dedup keys, IN-list ordering,
    /// and the stable intra-table emit order. Total and deterministic.
    pub fn render_key(&self) -> String {
        match self {
            PgValue::Null => "NULL".to_string(),
            PgValue::Bool(b) => b.to_string(),
            PgValue::Int(i) => i.to_string(),
            PgValue::Float(f) => f.to_string(),
            PgValue::Decimal(d) => d.to_string(),
            PgValue::Text(s) => s.clone(),
            PgValue::Bytes(b) => hex_lower(b),
            PgValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
            PgValue::Date(d) => d.to_string(),
            PgValue::Time(t) => t.to_string(),
            PgValue::Uuid(u) => u.to_string(),
            PgValue::Json(v) => v.to_string(),
        }
    }

    /// Convert to a JSON value for the JSON writer.
    ///
    /// Fails on non-finite floats, which have no JSON representation.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self {
            PgValue::Null => Ok(serde_json::Value::Null),
            PgValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            PgValue::Int(i) => Ok(serde_json::Value::Number((*i).into())),
            PgValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::Emit(format!("non-finite float {f} cannot be encoded"))),
            PgValue::Decimal(d) => Ok(serde_json::Value::String(d.to_string())),
            PgValue::Text(s) => Ok(serde_json::Value::String(s.clone())),
            PgValue::Bytes(b) => Ok(serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(b),
            )),
            PgValue::Timestamp(ts) => Ok(serde_json::Value::String(
                ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )),
            PgValue::Date(d) => Ok(serde_json::Value::String(d.to_string())),
            PgValue::Time(t) => Ok(serde_json::Value::String(t.to_string())),
            PgValue::Uuid(u) => Ok(serde_json::Value::String(u.to_string())),
            PgValue::Json(v) => Ok(v.clone()),
        }
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Values re-enter the database as statement parameters. Encoding follows
/// the parameter type the prepared statement reports, not the tag: integers
/// narrow to the column width, timestamps drop the offset for `timestamp`
/// columns, and text carried through the jsonb projection is re-parsed so a
/// `$n::jsonb` placeholder receives real JSON.
impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(b) => b.to_sql(ty, out),
            PgValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            PgValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            PgValue::Decimal(d) => d.to_sql(ty, out),
            PgValue::Text(s) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.to_sql(ty, out),
            },
            PgValue::Bytes(b) => b.to_sql(ty, out),
            PgValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                _ => ts.to_sql(ty, out),
            },
            PgValue::Date(d) => d.to_sql(ty, out),
            PgValue::Time(t) => t.to_sql(ty, out),
            PgValue::Uuid(u) => u.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
