//! Equality and set-membership filters over record fields.
//!
//! JSON form: `{"field": value}` for equality and
//! `{"field": {"$in": [v1, v2]}}` for membership.

use crate::error::{ApiError, ApiResult};
use crate::model::record::{Record, RecordId, ID_FIELD};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

const IN_OPERATOR: &str = "$in";

/// Predicate applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value. `Null` matches SQL `NULL`.
    Eq(Value),
    /// Field is one of the values. An empty set matches nothing.
    In(Vec<Value>),
}

/// Conjunction of per-field predicates. Empty filters match every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: BTreeMap<String, Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality filter on every field of `record`.
    pub fn from_record(record: &Record) -> Self {
        let predicates = record
            .iter()
            .map(|(field, value)| (field.clone(), Predicate::Eq(value.clone())))
            .collect();
        Self { predicates }
    }

    /// Filter matching the given primary keys.
    pub fn id_in(ids: &[RecordId]) -> Self {
        Self::new().with_in(ID_FIELD, ids.iter().map(|id| Value::from(*id)).collect())
    }

    pub fn with_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates
            .insert(field.into(), Predicate::Eq(value.into()));
        self
    }

    pub fn with_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.insert(field.into(), Predicate::In(values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.predicates.get(field)
    }

    /// Iterates predicates in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.predicates
            .iter()
            .map(|(field, predicate)| (field.as_str(), predicate))
    }

    /// Converts an equality-only filter into an insert body.
    ///
    /// # Errors
    /// - `InvalidFilter` when any predicate is a set membership.
    pub fn to_insert_body(&self) -> ApiResult<Record> {
        let mut body = Record::new();
        for (field, predicate) in &self.predicates {
            match predicate {
                Predicate::Eq(value) => {
                    body.insert(field.clone(), value.clone());
                }
                Predicate::In(_) => {
                    return Err(ApiError::InvalidFilter(format!(
                        "`{IN_OPERATOR}` on `{field}` cannot be used as an insert value"
                    )));
                }
            }
        }
        Ok(body)
    }

    /// Renders the filter in its JSON form.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (field, predicate) in &self.predicates {
            let rendered = match predicate {
                Predicate::Eq(value) => value.clone(),
                Predicate::In(values) => {
                    let mut operator = Map::new();
                    operator.insert(IN_OPERATOR.to_string(), Value::Array(values.clone()));
                    Value::Object(operator)
                }
            };
            object.insert(field.clone(), rendered);
        }
        Value::Object(object)
    }

    /// Parses the JSON form.
    ///
    /// # Errors
    /// - `InvalidFilter` for non-object input, unknown operators, or `$in`
    ///   without an array operand.
    pub fn from_json(value: &Value) -> ApiResult<Self> {
        let Value::Object(object) = value else {
            return Err(ApiError::InvalidFilter(format!(
                "expected a JSON object, got `{value}`"
            )));
        };

        let mut filter = Self::new();
        for (field, operand) in object {
            let predicate = match operand {
                Value::Object(operator) => parse_operator(field, operator)?,
                other => Predicate::Eq(other.clone()),
            };
            filter.predicates.insert(field.clone(), predicate);
        }
        Ok(filter)
    }

    /// Order-independent string key, stable across calls.
    pub fn canonical_key(&self) -> String {
        self.to_json().to_string()
    }
}

fn parse_operator(field: &str, operator: &Map<String, Value>) -> ApiResult<Predicate> {
    if operator.len() != 1 {
        return Err(ApiError::InvalidFilter(format!(
            "field `{field}` must use exactly one operator"
        )));
    }
    match operator.get(IN_OPERATOR) {
        Some(Value::Array(values)) => Ok(Predicate::In(values.clone())),
        Some(other) => Err(ApiError::InvalidFilter(format!(
            "`{IN_OPERATOR}` on `{field}` expects an array, got `{other}`"
        ))),
        None => Err(ApiError::InvalidFilter(format!(
            "unsupported operator on `{field}`; expected `{IN_OPERATOR}`"
        ))),
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
