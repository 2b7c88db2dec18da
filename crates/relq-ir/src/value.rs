//! Runtime values: constants in the IR, bound parameter values and
//! materialized results.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::DataType;

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("Type mismatch: expected {expected:?}, got {found}")]
    TypeMismatch { expected: DataType, found: String },

    #[error("Invalid {kind} literal: {text}")]
    InvalidLiteral { kind: &'static str, text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Array(Vec<Value>),
    Record(Vec<(String, Value)>),
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a field of a record value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert a value read from a row into the requested type.
    ///
    /// Drivers hand back the storage representation (`BIT` as an integer,
    /// temporal values as text), so this accepts those forms too.
    pub fn coerce(self, ty: &DataType) -> Result<Value, ValueError> {
        let mismatch = |found: &Value| ValueError::TypeMismatch {
            expected: ty.clone(),
            found: found.kind().to_string(),
        };

        match (ty, self) {
            (_, Value::Null) => Ok(Value::Null),
            (DataType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (DataType::Bool, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (DataType::Int16 | DataType::Int32 | DataType::Int64, Value::Int(i)) => Ok(Value::Int(i)),
            (DataType::Int16 | DataType::Int32 | DataType::Int64, Value::Bool(b)) => {
                Ok(Value::Int(i64::from(b)))
            }
            (DataType::Float32 | DataType::Float64, Value::Float(f)) => Ok(Value::Float(f)),
            (DataType::Float32 | DataType::Float64, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (DataType::String, Value::String(s)) => Ok(Value::String(s)),
            (DataType::Blob, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (DataType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (DataType::Date, Value::String(s)) => parse_date(&s),
            (DataType::Timestamp, Value::Timestamp(t)) => Ok(Value::Timestamp(t)),
            (DataType::Timestamp, Value::String(s)) => parse_timestamp(&s),
            (DataType::Uuid, Value::Uuid(u)) => Ok(Value::Uuid(u)),
            (DataType::Uuid, Value::String(s)) => parse_uuid(&s),
            (DataType::Record(_), Value::Record(fields)) => Ok(Value::Record(fields)),
            (DataType::Collection(_), Value::Array(items)) => Ok(Value::Array(items)),
            (_, other) => Err(mismatch(&other)),
        }
    }

    /// Decode a JSON document into a value of the given type.
    ///
    /// Record fields are matched by name and missing fields become NULL. A
    /// JSON array where a record is expected yields its first element, which
    /// is how row-set JSON renders a single nested object.
    pub fn from_json(json: &serde_json::Value, ty: &DataType) -> Result<Value, ValueError> {
        use serde_json::Value as Json;

        let mismatch = || ValueError::TypeMismatch {
            expected: ty.clone(),
            found: json_kind(json).to_string(),
        };

        match (ty, json) {
            (_, Json::Null) => Ok(Value::Null),
            (DataType::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (DataType::Bool, Json::Number(n)) => {
                n.as_i64().map(|i| Value::Bool(i != 0)).ok_or_else(mismatch)
            }
            (DataType::Int16 | DataType::Int32 | DataType::Int64, Json::Number(n)) => {
                n.as_i64().map(Value::Int).ok_or_else(mismatch)
            }
            (DataType::Float32 | DataType::Float64, Json::Number(n)) => {
                n.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            (DataType::String, Json::String(s)) => Ok(Value::String(s.clone())),
            (DataType::Blob, Json::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(mismatch)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Bytes),
            (DataType::Date, Json::String(s)) => parse_date(s),
            (DataType::Timestamp, Json::String(s)) => parse_timestamp(s),
            (DataType::Uuid, Json::String(s)) => parse_uuid(s),
            (DataType::Record(fields), Json::Object(map)) => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    let value = match map.get(&field.name) {
                        Some(json) => Value::from_json(json, &field.data_type)?,
                        None => Value::Null,
                    };
                    values.push((field.name.clone(), value));
                }
                Ok(Value::Record(values))
            }
            (DataType::Record(_), Json::Array(items)) => match items.first() {
                Some(first) => Value::from_json(first, ty),
                None => Ok(Value::Null),
            },
            (DataType::Collection(element), Json::Array(items)) => items
                .iter()
                .map(|item| Value::from_json(item, element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(mismatch()),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn parse_date(text: &str) -> Result<Value, ValueError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|_| ValueError::InvalidLiteral {
            kind: "date",
            text: text.to_string(),
        })
}

fn parse_timestamp(text: &str) -> Result<Value, ValueError> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(Value::Timestamp)
        .ok_or_else(|| ValueError::InvalidLiteral {
            kind: "timestamp",
            text: text.to_string(),
        })
}

fn parse_uuid(text: &str) -> Result<Value, ValueError> {
    Uuid::parse_str(text)
        .map(Value::Uuid)
        .map_err(|_| ValueError::InvalidLiteral {
            kind: "uuid",
            text: text.to_string(),
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Values of the external inputs a query closes over, keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inputs {
    values: BTreeMap<String, Value>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldType;
    use serde_json::json;

    #[test]
    fn test_coerce_bit_to_bool() {
        assert_eq!(Value::Int(1).coerce(&DataType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(0).coerce(&DataType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(Value::Null.coerce(&DataType::Bool).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_mismatch() {
        let err = Value::String("x".into()).coerce(&DataType::Int32).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn test_from_json_nested_record() {
        let ty = DataType::Record(vec![
            FieldType::new("Title", DataType::String),
            FieldType::new(
                "Author",
                DataType::Record(vec![FieldType::new("Name", DataType::String)]),
            ),
            FieldType::new("Pages", DataType::Int32),
        ]);

        let value = Value::from_json(
            &json!([{ "Title": "Dune", "Author": { "Name": "Herbert" } }]),
            &ty,
        )
        .unwrap();

        assert_eq!(value.field("Title"), Some(&Value::String("Dune".into())));
        assert_eq!(
            value.field("Author").and_then(|a| a.field("Name")),
            Some(&Value::String("Herbert".into()))
        );
        assert_eq!(value.field("Pages"), Some(&Value::Null));
    }

    #[test]
    fn test_from_json_collection() {
        let ty = DataType::Collection(Box::new(DataType::Int32));
        let value = Value::from_json(&json!([1, 2, 3]), &ty).unwrap();
        assert_eq!(value, Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn test_from_json_temporal() {
        let date = Value::from_json(&json!("2024-02-29"), &DataType::Date).unwrap();
        assert_eq!(date.to_string(), "2024-02-29");

        let ts = Value::from_json(&json!("2024-02-29T10:30:00"), &DataType::Timestamp).unwrap();
        assert!(matches!(ts, Value::Timestamp(_)));

        assert!(Value::from_json(&json!("not a date"), &DataType::Date).is_err());
    }

    #[test]
    fn test_inputs_json_round_trip() {
        let inputs = Inputs::new().with("minAge", 30).with("name", "Ada");
        let json = serde_json::to_string(&inputs).unwrap();
        let parsed: Inputs = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, inputs);
        assert_eq!(parsed.get("minAge"), Some(&Value::Int(30)));
    }
}
