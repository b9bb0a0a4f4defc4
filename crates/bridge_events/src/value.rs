//! Scripting-layer values as seen by the bridge.

use std::collections::BTreeMap;

/// A handler's return value, converted out of the scripting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    /// A table/dict with string keys. Non-string keys are rendered as
    /// `[key]` so they show up as unexpected fields.
    Record(BTreeMap<String, ScriptValue>),
    /// Anything else (functions, userdata, threads), by type name.
    Other(&'static str),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Integer(_) => "integer",
            ScriptValue::Number(_) => "number",
            ScriptValue::Text(_) => "string",
            ScriptValue::Record(_) => "record",
            ScriptValue::Other(name) => name,
        }
    }

    /// Integral value; floats are accepted only when they have no fraction.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(i) => Some(*i),
            ScriptValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(i) => Some(*i as f64),
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}
