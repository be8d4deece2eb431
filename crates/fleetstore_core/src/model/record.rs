//! Record representation and SQLite value conversion.

use crate::error::{ApiError, ApiResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Map, Number, Value};

/// Primary key of every resource row.
pub type RecordId = i64;

/// One resource row: field name to JSON-compatible value.
pub type Record = Map<String, Value>;

/// Field name of the primary key column.
pub const ID_FIELD: &str = "id";

/// Reads the `id` field of a record, if it holds an integer.
pub fn record_id(record: &Record) -> Option<RecordId> {
    record.get(ID_FIELD).and_then(Value::as_i64)
}

/// Reads the `id` field or reports the record as malformed.
pub fn require_record_id(resource: &str, record: &Record) -> ApiResult<RecordId> {
    record_id(record).ok_or_else(|| ApiError::InvalidValue {
        field: ID_FIELD.to_string(),
        message: format!("`{resource}` record has no integer id"),
    })
}

/// Builds a record from a JSON object value.
pub fn record_from_json(value: Value) -> ApiResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ApiError::InvalidValue {
            field: "<record>".to_string(),
            message: format!("expected a JSON object, got `{other}`"),
        }),
    }
}

/// Returns `base` overlaid with `overlay`; keys of `overlay` win.
pub fn merge_records(base: &Record, overlay: &Record) -> Record {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub(crate) fn json_to_sql(field: &str, value: &Value) -> ApiResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(SqlValue::Integer(integer))
            } else if let Some(real) = number.as_f64() {
                Ok(SqlValue::Real(real))
            } else {
                Err(ApiError::InvalidValue {
                    field: field.to_string(),
                    message: format!("number `{number}` is out of range"),
                })
            }
        }
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Array(_) | Value::Object(_) => Err(ApiError::InvalidValue {
            field: field.to_string(),
            message: "nested values cannot be stored in a column".to_string(),
        }),
    }
}

pub(crate) fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::Number(integer.into()),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(
            bytes
                .iter()
                .map(|byte| Value::Number(u64::from(*byte).into()))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{json_to_sql, merge_records, record_from_json, record_id, sql_to_json};
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::json;

    #[test]
    fn merge_prefers_overlay_keys() {
        let base = record_from_json(json!({"device_id": 5, "name": "A", "value": "old"}))
            .expect("base record");
        let overlay = record_from_json(json!({"value": "new"})).expect("overlay record");

        let merged = merge_records(&base, &overlay);
        assert_eq!(merged.get("value"), Some(&json!("new")));
        assert_eq!(merged.get("device_id"), Some(&json!(5)));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn record_id_requires_integer() {
        let with_id = record_from_json(json!({"id": 7})).expect("record");
        let with_text_id = record_from_json(json!({"id": "7"})).expect("record");
        assert_eq!(record_id(&with_id), Some(7));
        assert_eq!(record_id(&with_text_id), None);
    }

    #[test]
    fn record_from_json_rejects_non_objects() {
        assert!(record_from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn converts_scalars_and_rejects_nested_values() {
        assert_eq!(json_to_sql("f", &json!(true)).expect("bool"), SqlValue::Integer(1));
        assert_eq!(json_to_sql("f", &json!(2.5)).expect("real"), SqlValue::Real(2.5));
        assert_eq!(
            json_to_sql("f", &json!("x")).expect("text"),
            SqlValue::Text("x".to_string())
        );
        assert!(json_to_sql("f", &json!({"a": 1})).is_err());
        assert!(json_to_sql("f", &json!([1])).is_err());
    }

    #[test]
    fn reads_sqlite_values_back_as_json() {
        assert_eq!(sql_to_json(ValueRef::Integer(3)), json!(3));
        assert_eq!(sql_to_json(ValueRef::Text(b"abc")), json!("abc"));
        assert_eq!(sql_to_json(ValueRef::Null), json!(null));
    }
}
