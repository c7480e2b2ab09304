use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

pub type Attributes = BTreeMap<String, PpsValue>;

/// `Int` compares equal to `Number` of the same value; the native decoder only
/// yields `Number`. `Deleted` is distinct from both `Null` and `""`.
#[derive(Debug, Clone, Default)]
pub enum PpsValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    String(String),
    Array(Vec<PpsValue>),
    Object(Attributes),
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value cannot be represented: {0}")]
    Unrepresentable(String),
    #[error("expected a map-like value, found {0}")]
    NotAnObject(&'static str),
}

impl PpsValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Deleted => "deleted",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Number(value)
                if value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PpsValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Attributes> {
        match self {
            Self::Object(attributes) => Some(attributes),
            _ => None,
        }
    }

    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::String(value) => Some(value.clone()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Number(value) => Some(value.to_string()),
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Deleted => None,
        }
    }
}

impl PartialEq for PpsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Deleted, Self::Deleted) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Int(a), Self::Number(b)) | (Self::Number(b), Self::Int(a)) => *a as f64 == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for PpsValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null | Self::Deleted => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Number(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(attributes) => {
                let mut map = serializer.serialize_map(Some(attributes.len()))?;
                for (key, value) in attributes {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<Value> for PpsValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(value),
            Value::Number(number) => number_from_json(&number),
            Value::String(value) => Self::String(value),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

fn number_from_json(number: &serde_json::Number) -> PpsValue {
    if let Some(value) = number.as_i64() {
        return PpsValue::Int(value);
    }
    if let Some(value) = number.as_u64() {
        warn!(
            event = "pps_value_precision",
            value, "unsigned integer beyond i64 range kept as double"
        );
        return PpsValue::Number(value as f64);
    }
    PpsValue::Number(number.as_f64().unwrap_or(f64::NAN))
}

impl From<bool> for PpsValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PpsValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PpsValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for PpsValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PpsValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for PpsValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PpsValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<PpsValue>> for PpsValue {
    fn from(items: Vec<PpsValue>) -> Self {
        Self::Array(items)
    }
}

impl From<Attributes> for PpsValue {
    fn from(attributes: Attributes) -> Self {
        Self::Object(attributes)
    }
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<PpsValue, ValueError> {
    serde_json::to_value(value)
        .map(PpsValue::from)
        .map_err(|err| ValueError::Unrepresentable(err.to_string()))
}

pub fn to_attributes<T: Serialize + ?Sized>(value: &T) -> Result<Attributes, ValueError> {
    match to_value(value)? {
        PpsValue::Object(attributes) => Ok(attributes),
        other => Err(ValueError::NotAnObject(other.kind())),
    }
}
