//! Mapping between runtime API wire messages and invocation records.
//!
//! The control plane speaks plain HTTP: invocation metadata arrives as
//! response headers next to an opaque body, and reports go back as a body plus
//! a couple of classification headers. Nothing here touches the network.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::errors::{RuntimeClientError, RuntimeClientResult};
use crate::records::{InvocationError, InvocationRequest, InvocationResult, RuntimeFailure};

pub const API_VERSION_PREFIX: &str = "/2018-06-01/runtime";

pub const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
pub const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
pub const HEADER_FUNCTION_ARN: &str = "Lambda-Runtime-Invoked-Function-Arn";
pub const HEADER_DEADLINE_MS: &str = "Lambda-Runtime-Deadline-Ms";
pub const HEADER_CLIENT_CONTEXT: &str = "Lambda-Runtime-Client-Context";
pub const HEADER_COGNITO_IDENTITY: &str = "Lambda-Runtime-Cognito-Identity";
pub const HEADER_TENANT_ID: &str = "Lambda-Runtime-Aws-Tenant-Id";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_ERROR_TYPE: &str = "Lambda-Runtime-Function-Error-Type";
pub const HEADER_XRAY_ERROR_CAUSE: &str = "Lambda-Runtime-Function-XRay-Error-Cause";

pub const ERROR_CONTENT_TYPE: &str = "application/json";

/// X-Ray causes at or above this size are dropped instead of sent.
pub const MAX_XRAY_CAUSE_BYTES: usize = 1024 * 1024;

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Clone, Debug)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl WireRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
    }
}

#[derive(Clone, Debug, Default)]
pub struct WireResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub fn next_invocation_path() -> String {
    format!("{API_VERSION_PREFIX}/invocation/next")
}

pub fn invocation_response_path(request_id: &str) -> String {
    format!(
        "{API_VERSION_PREFIX}/invocation/{}/response",
        utf8_percent_encode(request_id, PATH_SEGMENT)
    )
}

pub fn invocation_error_path(request_id: &str) -> String {
    format!(
        "{API_VERSION_PREFIX}/invocation/{}/error",
        utf8_percent_encode(request_id, PATH_SEGMENT)
    )
}

pub fn init_error_path() -> String {
    format!("{API_VERSION_PREFIX}/init/error")
}

pub fn restore_next_path() -> String {
    format!("{API_VERSION_PREFIX}/restore/next")
}

pub fn restore_error_path() -> String {
    format!("{API_VERSION_PREFIX}/restore/error")
}

/// Decodes a successful `invocation/next` response.
///
/// The body is moved into the record untouched. Empty optional headers decode
/// as absent; a missing request id, function ARN, or unparsable deadline is a
/// protocol error.
pub fn decode_invocation(
    endpoint: &str,
    response: WireResponse,
) -> RuntimeClientResult<InvocationRequest> {
    let headers = &response.headers;
    let request_id = required_header(endpoint, headers, HEADER_REQUEST_ID)?;
    let function_arn = required_header(endpoint, headers, HEADER_FUNCTION_ARN)?;
    let deadline_raw = required_header(endpoint, headers, HEADER_DEADLINE_MS)?;
    let deadline_epoch_ms = deadline_raw.trim().parse::<u64>().map_err(|_| {
        RuntimeClientError::protocol(
            endpoint,
            format!("{HEADER_DEADLINE_MS} is not an epoch-milliseconds integer: {deadline_raw}"),
        )
    })?;

    Ok(InvocationRequest {
        trace_id: optional_header(headers, HEADER_TRACE_ID),
        client_context: optional_header(headers, HEADER_CLIENT_CONTEXT),
        content_type: optional_header(headers, HEADER_CONTENT_TYPE),
        cognito_identity: optional_header(headers, HEADER_COGNITO_IDENTITY),
        tenant_id: optional_header(headers, HEADER_TENANT_ID),
        payload: response.body,
        request_id,
        function_arn,
        deadline_epoch_ms,
    })
}

pub fn encode_result(result: &InvocationResult) -> RuntimeClientResult<WireRequest> {
    let path = invocation_response_path(&result.request_id);
    let mut request = WireRequest::post(path, result.body.clone());
    let content_type = header_value(&request.path, HEADER_CONTENT_TYPE, &result.content_type)?;
    request
        .headers
        .insert(reqwest::header::CONTENT_TYPE, content_type);
    Ok(request)
}

pub fn encode_error(error: &InvocationError) -> RuntimeClientResult<WireRequest> {
    let path = invocation_error_path(&error.request_id);
    let mut request = WireRequest::post(path, error.error_body.clone());
    apply_error_headers(&mut request, &error.error_type)?;
    if let Some(cause) = error.xray_cause.as_deref() {
        apply_xray_cause(&mut request, cause);
    }
    Ok(request)
}

/// Encodes an init or restore failure against `path`.
pub fn encode_runtime_failure(
    path: String,
    failure: &RuntimeFailure,
) -> RuntimeClientResult<WireRequest> {
    let mut request = WireRequest::post(path, failure.error_body.clone());
    apply_error_headers(&mut request, &failure.error_type)?;
    Ok(request)
}

fn apply_error_headers(request: &mut WireRequest, error_type: &str) -> RuntimeClientResult<()> {
    let content_type = HeaderValue::from_static(ERROR_CONTENT_TYPE);
    request
        .headers
        .insert(reqwest::header::CONTENT_TYPE, content_type);
    if !error_type.is_empty() {
        let value = header_value(&request.path, HEADER_ERROR_TYPE, error_type)?;
        let name = HeaderName::from_static("lambda-runtime-function-error-type");
        request.headers.insert(name, value);
    }
    Ok(())
}

fn apply_xray_cause(request: &mut WireRequest, cause: &str) {
    if cause.is_empty() {
        return;
    }
    if cause.len() >= MAX_XRAY_CAUSE_BYTES {
        tracing::warn!(
            path = %request.path,
            size = cause.len(),
            "dropping oversized x-ray error cause"
        );
        return;
    }
    match HeaderValue::from_str(cause) {
        Ok(value) => {
            let name = HeaderName::from_static("lambda-runtime-function-xray-error-cause");
            request.headers.insert(name, value);
        }
        Err(_) => {
            tracing::warn!(
                path = %request.path,
                "dropping x-ray error cause with invalid header characters"
            );
        }
    }
}

fn header_value(path: &str, name: &str, value: &str) -> RuntimeClientResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        let detail = format!("{name} is not a valid header value: {value:?}");
        RuntimeClientError::protocol(path, detail)
    })
}

/// Empty or undecodable optional fields come back as absent; the invocation
/// itself stays reportable.
fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match std::str::from_utf8(value.as_bytes()) {
        Ok("") => None,
        Ok(text) => Some(text.to_string()),
        Err(_) => {
            tracing::warn!(
                header = name,
                "ignoring optional header that is not valid UTF-8"
            );
            None
        }
    }
}

fn required_header(path: &str, headers: &HeaderMap, name: &str) -> RuntimeClientResult<String> {
    let Some(value) = headers.get(name) else {
        return Err(missing_header(path, name));
    };
    let text = std::str::from_utf8(value.as_bytes()).map_err(|_| {
        RuntimeClientError::protocol(path, format!("{name} header is not valid UTF-8"))
    })?;
    if text.is_empty() {
        return Err(missing_header(path, name));
    }
    Ok(text.to_string())
}

fn missing_header(path: &str, name: &str) -> RuntimeClientError {
    RuntimeClientError::protocol(path, format!("missing required header {name}"))
}
