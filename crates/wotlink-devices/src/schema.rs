//! Action input validation derived from Thing Description input schemas.
//!
//! [`build_schema`] turns the declarative `input` of an action into a list
//! of [`FieldValidator`]s. Validation happens before any request is made.

use serde_json::{Map, Number, Value};

use crate::error::{WotError, WotResult};
use crate::td::ActionDef;

/// Value type a field is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldKind {
    /// Map a WoT data type; unknown types validate as strings.
    pub fn from_wot_type(data_type: &str) -> Self {
        match data_type {
            "number" => Self::Number,
            "integer" => Self::Integer,
            "boolean" => Self::Boolean,
            _ => Self::String,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// Validator for one input field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValidator {
    pub name: String,
    pub kind: FieldKind,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Allowed values (`enum`)
    pub allowed: Option<Vec<Value>>,
    pub required: bool,
    /// Filled in when an optional field is absent
    pub default: Option<Value>,
}

impl FieldValidator {
    /// Coerce `value` to the field type and apply range and enum checks.
    pub fn check(&self, value: &Value) -> WotResult<Value> {
        let coerced = self.coerce(value)?;

        if self.kind.is_numeric() {
            if let Some(n) = coerced.as_f64() {
                if let Some(min) = self.minimum {
                    if n < min {
                        return Err(self.invalid(format!("value {} is below minimum {}", n, min)));
                    }
                }
                if let Some(max) = self.maximum {
                    if n > max {
                        return Err(self.invalid(format!("value {} is above maximum {}", n, max)));
                    }
                }
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|candidate| values_equal(candidate, &coerced)) {
                return Err(self.invalid(format!(
                    "value {} is not one of {}",
                    coerced,
                    Value::Array(allowed.clone())
                )));
            }
        }

        Ok(coerced)
    }

    fn coerce(&self, value: &Value) -> WotResult<Value> {
        match self.kind {
            FieldKind::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(self.invalid(format!("expected a string, got {}", other))),
            },
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(self.invalid(format!("expected a boolean, got {}", other))),
            },
            FieldKind::Number => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                n.and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| self.invalid(format!("expected a number, got {}", value)))
            }
            FieldKind::Integer => {
                let n = match value {
                    Value::Number(n) => n.as_i64().or_else(|| {
                        n.as_f64()
                            .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                            .map(|f| f.trunc() as i64)
                    }),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                n.map(Value::from)
                    .ok_or_else(|| self.invalid(format!("expected an integer, got {}", value)))
            }
        }
    }

    fn invalid(&self, reason: String) -> WotError {
        WotError::Validation(format!("Field '{}': {}", self.name, reason))
    }
}

/// Equality that treats `50` and `50.0` as the same value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Derived input schema of an action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSchema {
    pub fields: Vec<FieldValidator>,
}

impl ActionSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValidator> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate `input`, returning coerced values with defaults filled in.
    ///
    /// Keys the schema does not name are carried through untouched.
    pub fn validate(&self, input: &Map<String, Value>) -> WotResult<Map<String, Value>> {
        let mut output = Map::new();

        for field in &self.fields {
            match input.get(&field.name) {
                Some(value) => {
                    output.insert(field.name.clone(), field.check(value)?);
                }
                None if field.required => {
                    return Err(WotError::Validation(format!(
                        "Required field '{}' is missing",
                        field.name
                    )));
                }
                None => {
                    if let Some(default) = &field.default {
                        output.insert(field.name.clone(), field.check(default)?);
                    }
                }
            }
        }

        for (key, value) in input {
            if !output.contains_key(key) && self.field(key).is_none() {
                output.insert(key.clone(), value.clone());
            }
        }

        Ok(output)
    }
}

/// Derive validators from an action's `input.properties`.
pub fn build_schema(action: &ActionDef) -> ActionSchema {
    let Some(input) = action.input.as_ref() else {
        return ActionSchema::default();
    };
    let Some(properties) = input.properties.as_ref() else {
        return ActionSchema::default();
    };

    let fields = properties
        .iter()
        .map(|(name, spec)| {
            let kind = FieldKind::from_wot_type(spec.get("type").and_then(Value::as_str).unwrap_or("string"));
            FieldValidator {
                name: name.clone(),
                kind,
                minimum: spec.get("minimum").and_then(Value::as_f64),
                maximum: spec.get("maximum").and_then(Value::as_f64),
                allowed: spec.get("enum").and_then(Value::as_array).cloned(),
                required: input.is_required(name),
                default: spec.get("default").filter(|v| !v.is_null()).cloned(),
            }
        })
        .collect();

    ActionSchema { fields }
}
