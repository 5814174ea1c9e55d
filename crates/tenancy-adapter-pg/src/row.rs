//! Decoding query rows into JSON maps.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value, json};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};
use uuid::Uuid;

/// Convert a row into a column name to JSON value map.
///
/// Types without a JSON counterpart become `null`.
pub(crate) fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();

    for column in row.columns() {
        let name = column.name();

        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<i16>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<Uuid>, _>(name) {
            json!(v.map(|id| id.to_string()))
        } else if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(name) {
            json!(v.map(|ts| ts.to_rfc3339()))
        } else if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(name) {
            json!(v.map(|ts| ts.to_string()))
        } else if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(name) {
            json!(v)
        } else if let Ok(v) = row.try_get::<Option<Value>, _>(name) {
            v.unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        map.insert(name.to_string(), value);
    }

    map
}
