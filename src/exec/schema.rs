// src/exec/schema.rs

//! A small declarative schema for handler specs and outputs.

use serde_json::{Map, Value};

use crate::errors::{Result, TrellisError};
use crate::template::context::type_name;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Bool,
    Integer,
    Number,
    Array(Box<FieldType>),
    Object,
    Any,
}

impl FieldType {
    pub fn array_of(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    fn describe(&self) -> String {
        match self {
            FieldType::String => "string".to_string(),
            FieldType::Bool => "boolean".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Array(inner) => format!("array of {}", inner.describe()),
            FieldType::Object => "object".to_string(),
            FieldType::Any => "any value".to_string(),
        }
    }

    /// Check `value`, reporting the first mismatch as `(path, message)`.
    fn check(&self, value: &Value, path: &str) -> std::result::Result<(), (String, String)> {
        let ok = match (self, value) {
            (FieldType::Any, _) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            (FieldType::Array(inner), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.check(item, &format!("{path}[{i}]"))?;
                }
                true
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err((
                path.to_string(),
                format!("must be {}, got {}", self.describe(), type_name(value)),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
}

/// Named, typed fields of a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSchema {
    fields: Vec<FieldSchema>,
    allow_unknown: bool,
}

impl ActionSchema {
    /// A schema that rejects fields it does not declare.
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema that accepts undeclared fields as-is.
    pub fn open() -> Self {
        Self {
            fields: Vec::new(),
            allow_unknown: true,
        }
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    pub fn required(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.to_string(),
            field_type,
            required: true,
            default: None,
        });
        self
    }

    pub fn optional(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.to_string(),
            field_type,
            required: false,
            default: None,
        });
        self
    }

    /// Optional field filled with `default` when absent or null.
    pub fn with_default(mut self, name: &str, field_type: FieldType, default: Value) -> Self {
        self.fields.push(FieldSchema {
            name: name.to_string(),
            field_type,
            required: false,
            default: Some(default),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Validate `value` and return it with defaults applied.
    ///
    /// `context` names the owner (task key) and `root` the document being
    /// checked (`spec`, `outputs`) for the error's field path.
    pub fn validate(&self, value: &Value, context: &str, root: &str) -> Result<Value> {
        let Value::Object(map) = value else {
            return Err(TrellisError::validation(
                context,
                root,
                format!("must be an object, got {}", type_name(value)),
            ));
        };

        let mut out: Map<String, Value> = map.clone();

        for field in self.fields.iter() {
            let path = format!("{root}.{}", field.name);
            match map.get(&field.name) {
                None | Some(Value::Null) => {
                    if let Some(default) = &field.default {
                        out.insert(field.name.clone(), default.clone());
                    } else if field.required {
                        return Err(TrellisError::validation(context, path, "is required"));
                    } else {
                        out.remove(&field.name);
                    }
                }
                Some(v) => {
                    field
                        .field_type
                        .check(v, &path)
                        .map_err(|(p, m)| TrellisError::validation(context, p, m))?;
                }
            }
        }

        if !self.allow_unknown {
            for key in map.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    return Err(TrellisError::validation(
                        context,
                        format!("{root}.{key}"),
                        "is not a known field",
                    ));
                }
            }
        }

        Ok(Value::Object(out))
    }
}
