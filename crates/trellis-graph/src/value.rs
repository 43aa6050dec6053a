//! Field values and per-type field schemas.
//!
//! Entity fields hold a closed set of value kinds. A [`Schema`] optionally
//! declares, per entity type, which kind each field must carry; declared
//! fields are checked when a mutation is applied. Types (and fields) without
//! a declaration accept any kind.

use crate::error::{GraphError, Result};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Type tag field of the replicated projection.
pub const TYPE_FIELD: &str = "type";
/// Parent reference field of the replicated projection.
pub const PARENT_FIELD: &str = "parent";
/// Constraint list field of the replicated projection.
pub const CONSTRAINTS_FIELD: &str = "constraints";

/// Field names owned by the graph structure itself. Ordinary assignments to
/// these names are rejected.
pub const RESERVED_FIELDS: [&str; 4] = [
    TYPE_FIELD,
    PARENT_FIELD,
    crate::order::ORDER_FIELD,
    CONSTRAINTS_FIELD,
];

pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// A field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent. Assigning `Null` removes the field.
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// A reference to another entity, by id.
    Ref(EntityId),
    /// A nested JSON document.
    Doc(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The kind of a non-null value.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::Number(_) => Some(FieldKind::Number),
            Value::Text(_) => Some(FieldKind::Text),
            Value::Ref(_) => Some(FieldKind::Ref),
            Value::Doc(_) => Some(FieldKind::Doc),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&EntityId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// The declared kind of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Number,
    Text,
    Ref,
    Doc,
    /// Accepts any kind.
    Any,
}

impl FieldKind {
    pub fn accepts(&self, kind: FieldKind) -> bool {
        *self == FieldKind::Any || *self == kind
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Number => "number",
            FieldKind::Text => "text",
            FieldKind::Ref => "ref",
            FieldKind::Doc => "doc",
            FieldKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// Declared fields of one entity type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl TypeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }
}

/// Field schemas keyed by entity type tag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    types: HashMap<String, TypeSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type.
    pub fn with_type(mut self, kind: impl Into<String>, schema: TypeSchema) -> Self {
        self.types.insert(kind.into(), schema);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&TypeSchema> {
        self.types.get(kind)
    }

    /// Check a field value for an entity of type `kind`.
    ///
    /// `Null` always passes for non-reserved fields since it only clears.
    pub fn validate(&self, kind: &str, field: &str, value: &Value) -> Result<()> {
        if is_reserved(field) {
            return Err(GraphError::ReservedField(field.to_string()));
        }
        let Some(found) = value.kind() else {
            return Ok(());
        };
        match self.get(kind).and_then(|t| t.kind_of(field)) {
            Some(expected) if !expected.accepts(found) => Err(GraphError::TypeMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new().with_type(
            "rect",
            TypeSchema::new()
                .field("width", FieldKind::Number)
                .field("label", FieldKind::Text)
                .field("meta", FieldKind::Any),
        )
    }

    #[test]
    fn test_schema_accepts_declared_kind() {
        let schema = schema();
        assert!(schema.validate("rect", "width", &Value::Number(3.0)).is_ok());
        assert!(schema.validate("rect", "meta", &Value::Bool(true)).is_ok());
        assert!(schema.validate("rect", "width", &Value::Null).is_ok());
    }

    #[test]
    fn test_schema_rejects_wrong_kind() {
        let err = schema()
            .validate("rect", "width", &Value::from("wide"))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::TypeMismatch {
                field: "width".into(),
                expected: "number".into(),
                found: "text".into(),
            }
        );
    }

    #[test]
    fn test_schema_open_for_undeclared() {
        let schema = schema();
        assert!(schema.validate("rect", "color", &Value::from("red")).is_ok());
        assert!(schema.validate("ellipse", "width", &Value::from("x")).is_ok());
    }

    #[test]
    fn test_reserved_fields_rejected() {
        let schema = Schema::new();
        for field in RESERVED_FIELDS {
            assert_eq!(
                schema.validate("rect", field, &Value::Number(1.0)),
                Err(GraphError::ReservedField(field.to_string()))
            );
        }
    }

    #[test]
    fn test_value_serialization_is_tagged() {
        let json = serde_json::to_string(&Value::Number(0.5)).unwrap();
        assert_eq!(json, r#"{"kind":"number","value":0.5}"#);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Number(0.5));

        let r: Value = serde_json::from_str(r#"{"kind":"ref","value":"abc"}"#).unwrap();
        assert_eq!(r, Value::Ref(EntityId::from("abc")));
    }
}
