//! Type system for the relational IR

use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,

    // Text
    String,

    // Binary
    Blob,

    // Temporal
    Date,
    Timestamp,

    Uuid,

    // Complex
    Record(Vec<FieldType>),
    Collection(Box<DataType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldType {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

impl DataType {
    /// Scalars can travel as a single bound parameter or a single column.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Record(_) | DataType::Collection(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, DataType::Bool)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
        )
    }

    /// Element type of a collection.
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Collection(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldType> {
        match self {
            DataType::Record(fields) => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// The value an empty outer-join slot takes on.
    ///
    /// Numeric and boolean types default to zero/false; everything that is
    /// reference-like on the client (text, blobs, temporal values, records,
    /// collections) defaults to NULL.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int16 | DataType::Int32 | DataType::Int64 => Value::Int(0),
            DataType::Float32 | DataType::Float64 => Value::Float(0.0),
            DataType::String
            | DataType::Blob
            | DataType::Date
            | DataType::Timestamp
            | DataType::Uuid
            | DataType::Record(_)
            | DataType::Collection(_) => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_classification() {
        assert!(DataType::Int32.is_scalar());
        assert!(DataType::String.is_scalar());
        assert!(!DataType::Collection(Box::new(DataType::Int32)).is_scalar());
        assert!(!DataType::Record(vec![]).is_scalar());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DataType::Int64.default_value(), Value::Int(0));
        assert_eq!(DataType::Bool.default_value(), Value::Bool(false));
        assert_eq!(DataType::String.default_value(), Value::Null);
        assert_eq!(
            DataType::Record(vec![FieldType::new("Id", DataType::Int32)]).default_value(),
            Value::Null
        );
    }

    #[test]
    fn test_find_field() {
        let record = DataType::Record(vec![
            FieldType::new("Id", DataType::Int32),
            FieldType::new("Name", DataType::String),
        ]);
        assert_eq!(record.find_field("Name").map(|f| &f.data_type), Some(&DataType::String));
        assert!(record.find_field("Missing").is_none());
    }
}
