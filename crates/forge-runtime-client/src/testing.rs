use crate::adapter::RuntimeApiTransport;
use crate::codec::{
    HEADER_ERROR_TYPE, HEADER_XRAY_ERROR_CAUSE, WireRequest, WireResponse, init_error_path,
    next_invocation_path, restore_error_path, restore_next_path,
};
use crate::errors::{RuntimeClientError, RuntimeClientResult};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

const INVOCATION_PREFIX: &str = "/2018-06-01/runtime/invocation/";

/// Invocation waiting in the fake control plane's queue. Fields are the raw
/// header texts so malformed responses can be staged too.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedInvocation {
    pub request_id: String,
    pub function_arn: String,
    pub deadline_ms: String,
    pub trace_id: Option<String>,
    pub client_context: Option<String>,
    pub content_type: Option<String>,
    pub cognito_identity: Option<String>,
    pub tenant_id: Option<String>,
    pub body: Vec<u8>,
}

impl QueuedInvocation {
    pub fn new(
        request_id: impl Into<String>,
        function_arn: impl Into<String>,
        deadline_epoch_ms: u64,
        body: &[u8],
    ) -> Self {
        Self {
            request_id: request_id.into(),
            function_arn: function_arn.into(),
            deadline_ms: deadline_epoch_ms.to_string(),
            trace_id: None,
            client_context: None,
            content_type: None,
            cognito_identity: None,
            tenant_id: None,
            body: body.to_vec(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    fn headers(&self) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        let pairs = [
            ("lambda-runtime-aws-request-id", Some(&self.request_id)),
            (
                "lambda-runtime-invoked-function-arn",
                Some(&self.function_arn),
            ),
            ("lambda-runtime-deadline-ms", Some(&self.deadline_ms)),
            ("lambda-runtime-trace-id", self.trace_id.as_ref()),
            (
                "lambda-runtime-client-context",
                self.client_context.as_ref(),
            ),
            ("content-type", self.content_type.as_ref()),
            (
                "lambda-runtime-cognito-identity",
                self.cognito_identity.as_ref(),
            ),
            ("lambda-runtime-aws-tenant-id", self.tenant_id.as_ref()),
        ];
        for (name, value) in pairs {
            let Some(value) = value else {
                continue;
            };
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("queued invocation header {name} is not a valid value"))?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionKind {
    Response,
    Error,
}

/// What the fake control plane recorded for a finished invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCompletion {
    pub kind: CompletionKind,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub error_type: Option<String>,
    pub xray_cause: Option<String>,
}

/// In-memory fake of the runtime API control plane.
///
/// `invocation/next` waits until an invocation is queued. Reports for ids that
/// were never handed out, or that already completed, are refused.
#[derive(Clone, Debug, Default)]
pub struct MockRuntimeApi {
    inner: Arc<Mutex<MockRuntimeApiState>>,
    available: Arc<Notify>,
}

#[derive(Clone, Debug, Default)]
struct MockRuntimeApiState {
    queue: VecDeque<QueuedInvocation>,
    in_flight: BTreeSet<String>,
    completions: BTreeMap<String, MockCompletion>,
    runtime_failures: Vec<(String, String)>,
    requests: Vec<WireRequest>,
    injected_failure: Option<(u16, String)>,
}

impl MockRuntimeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_invocation(&self, invocation: QueuedInvocation) {
        if let Ok(mut state) = self.inner.lock() {
            state.queue.push_back(invocation);
        }
        self.available.notify_one();
    }

    /// Makes the next request, whatever it is, answer with `status`.
    pub fn fail_next_request(&self, status: u16, body: impl Into<String>) {
        if let Ok(mut state) = self.inner.lock() {
            state.injected_failure = Some((status, body.into()));
        }
        self.available.notify_one();
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.inner
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.inner
            .lock()
            .map(|state| state.requests.len())
            .unwrap_or_default()
    }

    pub fn completed(&self, request_id: &str) -> Option<MockCompletion> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.completions.get(request_id).cloned())
    }

    /// `(phase, error_type)` pairs for init and restore failures, in order.
    pub fn runtime_failures(&self) -> Vec<(String, String)> {
        self.inner
            .lock()
            .map(|state| state.runtime_failures.clone())
            .unwrap_or_default()
    }

    fn lock(&self, path: &str) -> RuntimeClientResult<MutexGuard<'_, MockRuntimeApiState>> {
        self.inner
            .lock()
            .map_err(|_| RuntimeClientError::transport(path, "mock runtime api mutex poisoned"))
    }

    async fn next_invocation(&self, path: &str) -> RuntimeClientResult<WireResponse> {
        loop {
            {
                let mut state = self.lock(path)?;
                if let Some((status, body)) = state.injected_failure.take() {
                    return Ok(text_response(status, body));
                }
                if let Some(invocation) = state.queue.pop_front() {
                    let headers = invocation
                        .headers()
                        .map_err(|detail| RuntimeClientError::transport(path, detail))?;
                    state.in_flight.insert(invocation.request_id.clone());
                    return Ok(WireResponse {
                        status: 200,
                        headers,
                        body: invocation.body,
                    });
                }
            }
            self.available.notified().await;
        }
    }

    fn complete(&self, request: &WireRequest) -> RuntimeClientResult<WireResponse> {
        let Some(rest) = request.path.strip_prefix(INVOCATION_PREFIX) else {
            return Ok(text_response(404, "unknown resource"));
        };
        let (request_id, kind) = match rest.rsplit_once('/') {
            Some((id, "response")) => (id, CompletionKind::Response),
            Some((id, "error")) => (id, CompletionKind::Error),
            _ => return Ok(text_response(404, "unknown resource")),
        };

        let mut state = self.lock(&request.path)?;
        if state.completions.contains_key(request_id) {
            return Ok(text_response(409, "invocation already completed"));
        }
        if !state.in_flight.remove(request_id) {
            return Ok(text_response(404, "unknown request id"));
        }
        state.completions.insert(
            request_id.to_string(),
            MockCompletion {
                kind,
                body: request.body.clone(),
                content_type: request.header("content-type").map(str::to_string),
                error_type: request.header(HEADER_ERROR_TYPE).map(str::to_string),
                xray_cause: request.header(HEADER_XRAY_ERROR_CAUSE).map(str::to_string),
            },
        );
        Ok(text_response(202, "{\"status\":\"OK\"}"))
    }

    fn record_runtime_failure(
        &self,
        phase: &str,
        request: &WireRequest,
    ) -> RuntimeClientResult<WireResponse> {
        let error_type = request.header(HEADER_ERROR_TYPE).unwrap_or_default();
        let mut state = self.lock(&request.path)?;
        state
            .runtime_failures
            .push((phase.to_string(), error_type.to_string()));
        Ok(text_response(202, "{\"status\":\"OK\"}"))
    }
}

#[async_trait]
impl RuntimeApiTransport for MockRuntimeApi {
    async fn send(&self, request: WireRequest) -> RuntimeClientResult<WireResponse> {
        let path = request.path.clone();
        self.lock(&path)?.requests.push(request.clone());

        if request.method == Method::GET && path == next_invocation_path() {
            return self.next_invocation(&path).await;
        }

        if let Some((status, body)) = self.lock(&path)?.injected_failure.take() {
            return Ok(text_response(status, body));
        }

        if request.method == Method::GET && path == restore_next_path() {
            return Ok(WireResponse::new(200));
        }
        if request.method == Method::POST && path == init_error_path() {
            return self.record_runtime_failure("init", &request);
        }
        if request.method == Method::POST && path == restore_error_path() {
            return self.record_runtime_failure("restore", &request);
        }
        if request.method == Method::POST {
            return self.complete(&request);
        }
        Ok(text_response(404, "unknown resource"))
    }
}

fn text_response(status: u16, body: impl Into<String>) -> WireResponse {
    let mut response = WireResponse::new(status);
    response.body = body.into().into_bytes();
    response
}
