use dbperms_integrations::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One inbound tool call. Lives for the duration of the request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub params: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result envelope: exactly one of `value` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn success(value: Value) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(ToolError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Outcome label used in invocation logs.
    pub fn outcome(&self) -> &'static str {
        match &self.error {
            None => "ok",
            Some(error) => error.kind.as_str(),
        }
    }

    pub fn to_json_string(&self) -> String {
        // the envelope only holds JSON values and strings
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"ok":false,"error":{{"kind":"TransportError","message":"failed to encode result: {}"}}}}"#,
                e
            )
        })
    }
}

impl From<Error> for ToolResult {
    fn from(error: Error) -> Self {
        Self::failure(error.kind(), error.message())
    }
}

impl From<Result<Value, Error>> for ToolResult {
    fn from(result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbperms_integrations::TransportError;
    use serde_json::json;

    #[test]
    fn test_success_omits_error() {
        let result = ToolResult::success(json!({"access_control_list": []}));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"ok": true, "value": {"access_control_list": []}})
        );
    }

    #[test]
    fn test_failure_omits_value() {
        let result: ToolResult =
            Error::Transport(TransportError::from_status(404, "Cluster c1 does not exist")).into();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"ok": false, "error": {"kind": "NotFound", "message": "Cluster c1 does not exist"}})
        );
        assert_eq!(result.outcome(), "NotFound");
    }
}
