// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Schema declaring the shared state fields of a workflow
///
/// Keys that are not declared are still writable; they use the overwrite
/// reducer and have no default.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    #[serde(default)]
    pub reducer: ReducerType,
    /// Default value
    pub default: Option<Value>,
}

/// Supported field types
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Reducer types for merging values into state
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}

impl FieldType {
    /// Whether a value written to the field matches its declared type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            // Appending a single element to an array field is allowed
            FieldType::Array => true,
            FieldType::Object => value.is_object(),
        }
    }
}

impl StateSchema {
    pub fn with_field(mut self, name: impl Into<String>, def: StateFieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Whether `value` may be written to `key`; undeclared keys take anything
    pub fn accepts(&self, key: &str, value: &Value) -> bool {
        self.fields
            .get(key)
            .map_or(true, |def| def.field_type.accepts(value))
    }

    /// Reducer for a key, overwrite when the key is undeclared
    pub fn reducer_for(&self, key: &str) -> ReducerType {
        self.fields
            .get(key)
            .map(|def| def.reducer.clone())
            .unwrap_or_default()
    }

    /// Initial field values taken from declared defaults
    pub fn initial_values(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, def)| def.default.clone().map(|v| (name.clone(), v)))
            .collect()
    }
}

impl StateFieldDef {
    pub fn new(field_type: FieldType, reducer: ReducerType) -> Self {
        Self {
            field_type,
            reducer,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Combine an incoming write with the current value
///
/// Returns `None` when the write leaves the field unchanged.
pub fn reduce(reducer: &ReducerType, current: Option<&Value>, incoming: Value) -> Option<Value> {
    match reducer {
        ReducerType::Overwrite => Some(incoming),
        ReducerType::Append => {
            let mut items = match current {
                Some(Value::Array(existing)) => existing.clone(),
                Some(other) => vec![other.clone()],
                None => Vec::new(),
            };
            match incoming {
                Value::Array(new_items) => items.extend(new_items),
                other => items.push(other),
            }
            Some(Value::Array(items))
        }
        ReducerType::Max | ReducerType::Min => {
            let new = incoming.as_f64()?;
            let keep_new = match current.and_then(Value::as_f64) {
                None => true,
                Some(old) if *reducer == ReducerType::Max => new > old,
                Some(old) => new < old,
            };
            keep_new.then_some(incoming)
        }
        ReducerType::Merge => match (current, incoming) {
            (Some(Value::Object(existing)), Value::Object(new_obj)) => {
                let mut merged: Map<String, Value> = existing.clone();
                merged.extend(new_obj);
                Some(Value::Object(merged))
            }
            (_, Value::Object(new_obj)) => Some(Value::Object(new_obj)),
            _ => None,
        },
    }
}
