// Message types for the admin process service.
// Mirrors proto/constellation.proto with JSON payloads decoded.

use constellation_core::{ErrorResponse, ParameterDescriptor, ParameterDescriptorGroup};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub value_type: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

impl From<&ParameterDescriptor> for ParameterSpec {
    fn from(descriptor: &ParameterDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            value_type: descriptor.value_type.as_str().to_string(),
            required: descriptor.required,
            default: descriptor.default.clone(),
            description: descriptor.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDescriptor {
    pub name: String,
    pub description: String,
    pub inputs: Vec<ParameterSpec>,
}

impl ProcessDescriptor {
    pub fn new(description: impl Into<String>, inputs: &ParameterDescriptorGroup) -> Self {
        Self {
            name: inputs.name.clone(),
            description: description.into(),
            inputs: inputs.descriptors.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListProcessesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListProcessesResponse {
    pub processes: Vec<ProcessDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteProcessRequest {
    pub name: String,
    pub input: Map<String, Value>,
}

impl ExecuteProcessRequest {
    pub fn new(name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteProcessResponse {
    pub success: bool,
    pub output: Option<Value>,
    pub error_code: Option<String>,
    pub message: String,
}

impl ExecuteProcessResponse {
    pub fn completed(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error_code: None,
            message: "ok".to_string(),
        }
    }

    pub fn failed(error: ErrorResponse) -> Self {
        let output = error
            .details
            .as_ref()
            .and_then(|details| serde_json::to_value(details).ok());
        Self {
            success: false,
            output,
            error_code: Some(error.error_code),
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_core::ParameterType;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_descriptor_from_parameter_group() {
        let group = ParameterDescriptorGroup::new(
            "restart",
            vec![
                ParameterDescriptor::optional("service", ParameterType::String)
                    .with_description("Service to restart"),
                ParameterDescriptor::optional("close_first", ParameterType::Boolean)
                    .with_default(false),
            ],
        );

        let descriptor = ProcessDescriptor::new("Restart workers", &group);
        assert_eq!(descriptor.name, "restart");
        assert_eq!(descriptor.inputs.len(), 2);
        assert_eq!(descriptor.inputs[0].value_type, "string");
        assert_eq!(descriptor.inputs[0].description, "Service to restart");
        assert_eq!(descriptor.inputs[1].default, Some(json!(false)));
        assert!(!descriptor.inputs[1].required);
    }

    #[test]
    fn test_failed_response_keeps_code_and_details() {
        let mut details = HashMap::new();
        details.insert("WMS/default".to_string(), "layerContext.json missing".to_string());
        let error = ErrorResponse::new("RESTART_FAILED", "1 worker failed").with_details(details);

        let response = ExecuteProcessResponse::failed(error);
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("RESTART_FAILED"));
        assert_eq!(response.message, "1 worker failed");
        assert_eq!(
            response.output.unwrap()["WMS/default"],
            "layerContext.json missing"
        );
    }

    #[test]
    fn test_failed_response_without_details_has_no_output() {
        let response =
            ExecuteProcessResponse::failed(ErrorResponse::new("PROCESS_NOT_FOUND", "nope"));
        assert!(response.output.is_none());
    }
}
