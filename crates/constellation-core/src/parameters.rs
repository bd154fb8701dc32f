//! Typed parameter descriptors used to validate provider configurations and
//! administration process inputs.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
    Path,
    StringList,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::Path => "path",
            ParameterType::StringList => "string_list",
            ParameterType::Object => "object",
        }
    }

    /// Coerce a raw value into this type. String forms of booleans, integers
    /// and comma separated lists are accepted since configuration documents
    /// often carry every value as text.
    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParameterType::String | ParameterType::Path, Value::String(_)) => Some(value.clone()),
            (ParameterType::Integer, Value::Number(n)) if n.is_i64() => Some(value.clone()),
            (ParameterType::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(Value::from)
            }
            (ParameterType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParameterType::Boolean, Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                }
            }
            (ParameterType::StringList, Value::Array(items)) => items
                .iter()
                .all(Value::is_string)
                .then(|| value.clone()),
            (ParameterType::StringList, Value::String(s)) => Some(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            )),
            (ParameterType::Object, Value::Object(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub value_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

impl ParameterDescriptor {
    pub fn required(name: impl Into<String>, value_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: true,
            default: None,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, value_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            default: None,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptorGroup {
    pub name: String,
    pub descriptors: Vec<ParameterDescriptor>,
}

impl ParameterDescriptorGroup {
    pub fn new(name: impl Into<String>, descriptors: Vec<ParameterDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
        }
    }

    pub fn descriptor(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Check `params` against the group and return the completed values,
    /// with defaults filled in for absent optional parameters.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<ParameterValues> {
        if let Some(unknown) = params.keys().find(|k| self.descriptor(k).is_none()) {
            return Err(CoreError::Configuration(format!(
                "parameter '{}' is not declared by group '{}'",
                unknown, self.name
            )));
        }

        let mut values = BTreeMap::new();
        for descriptor in &self.descriptors {
            let raw = params.get(&descriptor.name).filter(|v| !v.is_null());
            match raw {
                Some(raw) => {
                    let value = descriptor.value_type.coerce(raw).ok_or_else(|| {
                        CoreError::Configuration(format!(
                            "parameter '{}' of group '{}' expects a {} value, got {}",
                            descriptor.name,
                            self.name,
                            descriptor.value_type.as_str(),
                            raw
                        ))
                    })?;
                    values.insert(descriptor.name.clone(), value);
                }
                None => {
                    if let Some(default) = &descriptor.default {
                        values.insert(descriptor.name.clone(), default.clone());
                    } else if descriptor.required {
                        return Err(CoreError::Configuration(format!(
                            "missing required parameter '{}' in group '{}'",
                            descriptor.name, self.name
                        )));
                    }
                }
            }
        }

        Ok(ParameterValues { values })
    }
}

/// Parameter values that passed validation against a descriptor group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterValues {
    values: BTreeMap<String, Value>,
}

impl ParameterValues {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.values.get(name).and_then(Value::as_object)
    }

    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name).ok_or_else(|| {
            CoreError::Configuration(format!("missing required parameter '{name}'"))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
