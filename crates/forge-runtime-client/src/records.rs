use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codec::{
    HEADER_CLIENT_CONTEXT, HEADER_COGNITO_IDENTITY, HEADER_CONTENT_TYPE, HEADER_DEADLINE_MS,
    HEADER_FUNCTION_ARN, HEADER_REQUEST_ID, HEADER_TENANT_ID, HEADER_TRACE_ID,
};

pub type RequestId = String;

pub const DEFAULT_RESULT_CONTENT_TYPE: &str = "application/json";

/// One unit of work handed out by `invocation/next`.
///
/// Optional fields are `None` when the control plane sent nothing or an empty
/// value; they never hold an empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub payload: Vec<u8>,
    pub request_id: RequestId,
    pub trace_id: Option<String>,
    pub function_arn: String,
    pub deadline_epoch_ms: u64,
    pub client_context: Option<String>,
    pub content_type: Option<String>,
    pub cognito_identity: Option<String>,
    pub tenant_id: Option<String>,
}

impl InvocationRequest {
    /// Metadata keyed by wire header name, absent fields omitted.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert(
            HEADER_REQUEST_ID.to_string(),
            Value::String(self.request_id.clone()),
        );
        metadata.insert(
            HEADER_FUNCTION_ARN.to_string(),
            Value::String(self.function_arn.clone()),
        );
        metadata.insert(
            HEADER_DEADLINE_MS.to_string(),
            Value::from(self.deadline_epoch_ms),
        );

        let optional = [
            (HEADER_TRACE_ID, &self.trace_id),
            (HEADER_CLIENT_CONTEXT, &self.client_context),
            (HEADER_CONTENT_TYPE, &self.content_type),
            (HEADER_COGNITO_IDENTITY, &self.cognito_identity),
            (HEADER_TENANT_ID, &self.tenant_id),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                metadata.insert(name.to_string(), Value::String(value.clone()));
            }
        }
        metadata
    }

    pub fn deadline(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.deadline_epoch_ms)
    }

    /// Time left before the deadline as seen from `now`, zero once it has passed.
    pub fn remaining_time(&self, now: SystemTime) -> Duration {
        self.deadline()
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub request_id: RequestId,
    pub body: Vec<u8>,
    pub content_type: String,
}

impl InvocationResult {
    pub fn new(
        request_id: impl Into<RequestId>,
        body: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            body: body.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(request_id: impl Into<RequestId>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(request_id, body, DEFAULT_RESULT_CONTENT_TYPE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationError {
    pub request_id: RequestId,
    pub error_body: Vec<u8>,
    pub error_type: String,
    pub xray_cause: Option<String>,
}

impl InvocationError {
    pub fn new(
        request_id: impl Into<RequestId>,
        error_body: impl Into<Vec<u8>>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            error_body: error_body.into(),
            error_type: error_type.into(),
            xray_cause: None,
        }
    }

    pub fn with_xray_cause(mut self, cause: impl Into<String>) -> Self {
        self.xray_cause = Some(cause.into());
        self
    }
}

/// Failure reported outside of any invocation: during init or after a
/// snapshot restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFailure {
    pub error_body: Vec<u8>,
    pub error_type: String,
}

impl RuntimeFailure {
    pub fn new(error_body: impl Into<Vec<u8>>, error_type: impl Into<String>) -> Self {
        Self {
            error_body: error_body.into(),
            error_type: error_type.into(),
        }
    }
}
