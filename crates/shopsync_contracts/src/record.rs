#![forbid(unsafe_code)]

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::common::{validate_name, ContractViolation, Validate};

pub const RECORD_ID_MAX_LEN: usize = 256;

/// One value inside an inbound record. Mappings keep the key order the payload
/// arrived with.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<RecordValue>),
    Mapping(Vec<(String, RecordValue)>),
}

impl RecordValue {
    pub fn to_json(&self) -> Value {
        match self {
            RecordValue::Null => Value::Null,
            RecordValue::Bool(b) => Value::Bool(*b),
            RecordValue::Number(n) => Value::Number(n.clone()),
            RecordValue::String(s) => Value::String(s.clone()),
            RecordValue::Sequence(items) => {
                Value::Array(items.iter().map(RecordValue::to_json).collect())
            }
            RecordValue::Mapping(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
        }
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RecordValue::Null,
            Value::Bool(b) => RecordValue::Bool(b),
            Value::Number(n) => RecordValue::Number(n),
            Value::String(s) => RecordValue::String(s),
            Value::Array(items) => {
                RecordValue::Sequence(items.into_iter().map(RecordValue::from).collect())
            }
            Value::Object(map) => RecordValue::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, RecordValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        RecordValue::String(value.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        RecordValue::String(value)
    }
}

impl From<i64> for RecordValue {
    fn from(value: i64) -> Self {
        RecordValue::Number(Number::from(value))
    }
}

impl From<u64> for RecordValue {
    fn from(value: u64) -> Self {
        RecordValue::Number(Number::from(value))
    }
}

impl From<bool> for RecordValue {
    fn from(value: bool) -> Self {
        RecordValue::Bool(value)
    }
}

/// An inbound entity instance: field names in payload order, each mapped to a value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, RecordValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object. Anything other than an object is rejected.
    pub fn from_json(value: Value) -> Result<Self, ContractViolation> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(key, value)| (key, RecordValue::from(value)))
                    .collect(),
            }),
            _ => Err(ContractViolation::InvalidValue {
                field: "record",
                reason: "must be a JSON object",
            }),
        }
    }

    /// Sets `name` to `value`. An existing field keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RecordValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RecordValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn identifier(&self, field: &str) -> Result<RecordId, ContractViolation> {
        match self.get(field) {
            Some(value) => RecordId::from_value(field, value),
            None => Err(ContractViolation::MissingField {
                field: field.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len());
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

/// Identifier of a record, always compared in its string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    /// Numbers use their JSON display (`1` becomes `"1"`); strings pass through.
    pub fn from_value(field: &str, value: &RecordValue) -> Result<Self, ContractViolation> {
        let raw = match value {
            RecordValue::Number(n) => n.to_string(),
            RecordValue::String(s) => s.clone(),
            RecordValue::Null => {
                return Err(ContractViolation::InvalidIdentifier {
                    field: field.to_string(),
                    reason: "must not be null",
                })
            }
            RecordValue::Bool(_) | RecordValue::Sequence(_) | RecordValue::Mapping(_) => {
                return Err(ContractViolation::InvalidIdentifier {
                    field: field.to_string(),
                    reason: "must be a string or a number",
                })
            }
        };
        Self::new(raw).map_err(|_| ContractViolation::InvalidIdentifier {
            field: field.to_string(),
            reason: "must be non-empty text without control characters",
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for RecordId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_name("record_id", &self.0, RECORD_ID_MAX_LEN)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
