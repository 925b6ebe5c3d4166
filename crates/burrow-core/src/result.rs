use crate::error::{FailureKind, FileOpError};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(err: &FileOpError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_kind: self.error_kind,
        }
    }
}

impl<T> From<Result<T, FileOpError>> for OperationResult<T> {
    fn from(result: Result<T, FileOpError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_envelope_shape() {
        let err = FileOpError::CommandFailed {
            code: 1,
            stderr: "rm: cannot remove '/x': Permission denied".into(),
        };
        let result: OperationResult<()> = Err(err).into();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "success": false,
                "error": "Command failed with code 1: rm: cannot remove '/x': Permission denied",
                "errorKind": "operation"
            })
        );
    }

    #[test]
    fn success_envelope_shape() {
        let result = OperationResult::ok(json!({ "path": "/tmp/a" }));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "success": true, "data": { "path": "/tmp/a" } })
        );
    }
}
