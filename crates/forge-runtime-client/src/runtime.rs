use std::sync::Arc;

use crate::adapter::{ReqwestRuntimeTransport, RuntimeApiTransport};
use crate::codec::{
    WireRequest, WireResponse, decode_invocation, encode_error, encode_result,
    encode_runtime_failure, init_error_path, next_invocation_path, restore_error_path,
    restore_next_path,
};
use crate::errors::{RuntimeClientError, RuntimeClientResult};
use crate::records::{InvocationError, InvocationRequest, InvocationResult, RuntimeFailure};

/// Client for the runtime API bound to one control-plane endpoint.
///
/// Calls are issued one at a time by a single owner; nothing here retries.
#[derive(Debug)]
pub struct RuntimeApiClient<T> {
    transport: Arc<T>,
    endpoint: String,
}

impl<T> Clone for RuntimeApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl RuntimeApiClient<ReqwestRuntimeTransport> {
    /// Binds a client to `endpoint`, identifying itself with `user_agent`.
    pub fn initialize(endpoint: &str, user_agent: &str) -> RuntimeClientResult<Self> {
        let transport = ReqwestRuntimeTransport::new(endpoint, user_agent)?;
        tracing::debug!(endpoint, user_agent, "runtime api client initialized");
        Ok(Self::with_transport(endpoint, transport))
    }
}

impl<T> RuntimeApiClient<T>
where
    T: RuntimeApiTransport,
{
    pub fn with_transport(endpoint: impl Into<String>, transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Long-polls `invocation/next` until the control plane hands out work.
    pub async fn poll_next(&self) -> RuntimeClientResult<InvocationRequest> {
        let path = next_invocation_path();
        let request = WireRequest::get(path.clone());
        let response = self.send_expecting_success(request).await?;
        let invocation = decode_invocation(&path, response)?;
        tracing::debug!(
            request_id = %invocation.request_id,
            deadline_ms = invocation.deadline_epoch_ms,
            payload_len = invocation.payload.len(),
            "received invocation"
        );
        Ok(invocation)
    }

    pub async fn post_success(&self, result: &InvocationResult) -> RuntimeClientResult<()> {
        let request = encode_result(result)?;
        self.send_expecting_success(request).await?;
        Ok(())
    }

    pub async fn post_failure(&self, error: &InvocationError) -> RuntimeClientResult<()> {
        let request = encode_error(error)?;
        self.send_expecting_success(request).await?;
        Ok(())
    }

    /// Reports a failure that happened before the first poll.
    pub async fn post_init_error(&self, failure: &RuntimeFailure) -> RuntimeClientResult<()> {
        let request = encode_runtime_failure(init_error_path(), failure)?;
        self.send_expecting_success(request).await?;
        Ok(())
    }

    /// Waits on `restore/next` after a snapshot restore.
    pub async fn restore_next(&self) -> RuntimeClientResult<()> {
        self.send_expecting_success(WireRequest::get(restore_next_path()))
            .await?;
        Ok(())
    }

    pub async fn post_restore_error(&self, failure: &RuntimeFailure) -> RuntimeClientResult<()> {
        let request = encode_runtime_failure(restore_error_path(), failure)?;
        self.send_expecting_success(request).await?;
        Ok(())
    }

    async fn send_expecting_success(
        &self,
        request: WireRequest,
    ) -> RuntimeClientResult<WireResponse> {
        let path = request.path.clone();
        tracing::debug!(method = %request.method, path = %path, "runtime api request");
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        tracing::warn!(path = %path, status = response.status, "runtime api request rejected");
        Err(map_status(&path, &response))
    }
}

/// 400, 404, 409 and 410 mean the control plane refused the request id or the
/// report itself; other failures are treated as transport trouble.
fn map_status(path: &str, response: &WireResponse) -> RuntimeClientError {
    let body = response.body_text();
    match response.status {
        status @ (400 | 404 | 409 | 410) => RuntimeClientError::protocol(
            path,
            format!("control plane rejected request with status {status}: {body}"),
        ),
        status => RuntimeClientError::transport_status(path, status, body),
    }
}
