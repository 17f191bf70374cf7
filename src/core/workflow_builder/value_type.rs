//! The type algebra for values that may flow through workflow parameters.
//!
//! Argo moves every parameter around as a string. The builder keeps track of what
//! that string *means*: a scalar, a plain record or array (carried as JSON), or an
//! explicitly [`ValueType::Serialized`] value whose structure must be recovered with
//! a deserialize step before it can be inspected.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Null,
    Array(Box<ValueType>),
    Record(IndexMap<String, ValueType>),
    /// A string known to hold the JSON encoding of the inner type.
    Serialized(Box<ValueType>),
    /// Opaque JSON, e.g. an embedded Kubernetes object.
    Any,
}

impl ValueType {
    pub fn array(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ValueType)>,
    {
        ValueType::Record(
            fields
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    pub fn serialized(inner: ValueType) -> Self {
        ValueType::Serialized(Box::new(inner))
    }

    /// Infer the most precise type describing a literal JSON value.
    pub fn infer(value: &Value) -> ValueType {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(items) => {
                let mut element: Option<ValueType> = None;
                for item in items {
                    let inferred = ValueType::infer(item);
                    element = match element {
                        None => Some(inferred),
                        Some(existing) if existing == inferred => Some(existing),
                        Some(_) => Some(ValueType::Any),
                    };
                }
                ValueType::array(element.unwrap_or(ValueType::Any))
            }
            Value::Object(map) => ValueType::Record(
                map.iter()
                    .map(|(key, value)| (key.clone(), ValueType::infer(value)))
                    .collect(),
            ),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueType::String | ValueType::Number | ValueType::Boolean
        )
    }

    /// True for types whose runtime representation is a plain string.
    pub fn is_string_like(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Serialized(_))
    }

    /// True for types that travel as JSON text and must be decoded before use.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            ValueType::Array(_) | ValueType::Record(_) | ValueType::Any
        )
    }

    pub fn element_type(&self) -> Option<&ValueType> {
        match self {
            ValueType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Structural assignability: can a value of `self` be passed where `target` is declared?
    ///
    /// Records are width-subtyped (extra fields are fine, missing ones are not). A
    /// serialized value may be passed as a plain string, never the reverse.
    pub fn is_assignable_to(&self, target: &ValueType) -> bool {
        match (self, target) {
            (_, ValueType::Any) | (ValueType::Any, _) => true,
            (ValueType::Array(source), ValueType::Array(target)) => {
                source.is_assignable_to(target)
            }
            (ValueType::Record(source), ValueType::Record(target)) => {
                target.iter().all(|(name, target_ty)| {
                    source
                        .get(name)
                        .is_some_and(|source_ty| source_ty.is_assignable_to(target_ty))
                })
            }
            (ValueType::Serialized(source), ValueType::Serialized(target)) => {
                source.is_assignable_to(target)
            }
            (ValueType::Serialized(_), ValueType::String) => true,
            (source, target) => source == target,
        }
    }

    /// Check that a literal JSON value conforms to this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Number, Value::Number(_)) => true,
            (ValueType::Boolean, Value::Bool(_)) => true,
            (ValueType::Null, Value::Null) => true,
            (ValueType::Array(element), Value::Array(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (ValueType::Record(fields), Value::Object(map)) => fields
                .iter()
                .all(|(name, ty)| map.get(name).is_some_and(|value| ty.accepts(value))),
            (ValueType::Serialized(inner), Value::String(text)) => {
                serde_json::from_str::<Value>(text).is_ok_and(|decoded| inner.accepts(&decoded))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Number => write!(f, "number"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Null => write!(f, "null"),
            ValueType::Any => write!(f, "any"),
            ValueType::Array(element) => write!(f, "array<{}>", element),
            ValueType::Serialized(inner) => write!(f, "serialized<{}>", inner),
            ValueType::Record(fields) => {
                write!(f, "record{{")?;
                for (index, (name, ty)) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
