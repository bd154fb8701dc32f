use crate::protocol;
use crate::v1;
use serde_json::{Map, Value};
use std::convert::TryFrom;

fn encode(value: &Value) -> String {
    value.to_string()
}

fn decode(field: &str, raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("{field} is not valid JSON: {e}"))
}

// ParameterSpec
impl From<protocol::ParameterSpec> for v1::ParameterSpec {
    fn from(spec: protocol::ParameterSpec) -> Self {
        Self {
            name: spec.name,
            value_type: spec.value_type,
            required: spec.required,
            default_json: spec.default.as_ref().map(encode),
            description: spec.description,
        }
    }
}

impl TryFrom<v1::ParameterSpec> for protocol::ParameterSpec {
    type Error = String;

    fn try_from(spec: v1::ParameterSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            default: spec
                .default_json
                .as_deref()
                .map(|raw| decode("default_json", raw))
                .transpose()?,
            name: spec.name,
            value_type: spec.value_type,
            required: spec.required,
            description: spec.description,
        })
    }
}

// ProcessDescriptor
impl From<protocol::ProcessDescriptor> for v1::ProcessDescriptor {
    fn from(descriptor: protocol::ProcessDescriptor) -> Self {
        Self {
            name: descriptor.name,
            description: descriptor.description,
            inputs: descriptor.inputs.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<v1::ProcessDescriptor> for protocol::ProcessDescriptor {
    type Error = String;

    fn try_from(descriptor: v1::ProcessDescriptor) -> Result<Self, Self::Error> {
        Ok(Self {
            name: descriptor.name,
            description: descriptor.description,
            inputs: descriptor
                .inputs
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

// ListProcesses
impl From<protocol::ListProcessesRequest> for v1::ListProcessesRequest {
    fn from(_: protocol::ListProcessesRequest) -> Self {
        Self {}
    }
}

impl From<v1::ListProcessesRequest> for protocol::ListProcessesRequest {
    fn from(_: v1::ListProcessesRequest) -> Self {
        Self {}
    }
}

impl From<protocol::ListProcessesResponse> for v1::ListProcessesResponse {
    fn from(res: protocol::ListProcessesResponse) -> Self {
        Self {
            processes: res.processes.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<v1::ListProcessesResponse> for protocol::ListProcessesResponse {
    type Error = String;

    fn try_from(res: v1::ListProcessesResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            processes: res
                .processes
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

// ExecuteProcessRequest
impl From<protocol::ExecuteProcessRequest> for v1::ExecuteProcessRequest {
    fn from(req: protocol::ExecuteProcessRequest) -> Self {
        Self {
            name: req.name,
            input_json: encode(&Value::Object(req.input)),
        }
    }
}

impl TryFrom<v1::ExecuteProcessRequest> for protocol::ExecuteProcessRequest {
    type Error = String;

    /// An empty `input_json` is read as an empty object.
    fn try_from(req: v1::ExecuteProcessRequest) -> Result<Self, Self::Error> {
        if req.name.trim().is_empty() {
            return Err("process name is missing".to_string());
        }
        let input = if req.input_json.trim().is_empty() {
            Map::new()
        } else {
            match decode("input_json", &req.input_json)? {
                Value::Object(map) => map,
                other => {
                    return Err(format!(
                        "input_json must be a JSON object, got {}",
                        json_type(&other)
                    ))
                }
            }
        };
        Ok(Self {
            name: req.name,
            input,
        })
    }
}

// ExecuteProcessResponse
impl From<protocol::ExecuteProcessResponse> for v1::ExecuteProcessResponse {
    fn from(res: protocol::ExecuteProcessResponse) -> Self {
        Self {
            success: res.success,
            output_json: res.output.as_ref().map(encode),
            error_code: res.error_code,
            message: res.message,
        }
    }
}

impl TryFrom<v1::ExecuteProcessResponse> for protocol::ExecuteProcessResponse {
    type Error = String;

    fn try_from(res: v1::ExecuteProcessResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            success: res.success,
            output: res
                .output_json
                .as_deref()
                .map(|raw| decode("output_json", raw))
                .transpose()?,
            error_code: res.error_code,
            message: res.message,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
