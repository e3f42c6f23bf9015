use std::sync::Arc;

use serde_json::{Map, Value};

use crate::adapter::{ReqwestRuntimeTransport, RuntimeApiTransport};
use crate::bridge::ContextGuard;
use crate::codec::{next_invocation_path, restore_next_path};
use crate::config::RuntimeConfig;
use crate::errors::{RuntimeClientError, RuntimeClientResult};
use crate::records::{InvocationError, InvocationRequest, InvocationResult, RuntimeFailure};
use crate::runtime::RuntimeApiClient;

/// Lifecycle of the client handle owned by a [`RuntimeInterface`].
///
/// A failed poll has nothing left to report, so it lands back on
/// `Initialized` before `next` returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Initialized,
    Polling,
    PollSucceeded,
}

/// Binds a client handle to `(endpoint, user_agent)`.
pub type Connector<T> =
    Arc<dyn Fn(&str, &str) -> RuntimeClientResult<RuntimeApiClient<T>> + Send + Sync>;

/// Caller-facing runtime surface: one handle, created by `initialize`, driven
/// through `next` and the report calls in program order.
///
/// Only the waits (`next`, `restore_next`) release the caller's execution
/// context; reports run while it stays held.
pub struct RuntimeInterface<T = ReqwestRuntimeTransport> {
    endpoint: String,
    connector: Connector<T>,
    client: Option<RuntimeApiClient<T>>,
    state: ClientState,
}

impl RuntimeInterface<ReqwestRuntimeTransport> {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_connector(config.endpoint.clone(), RuntimeApiClient::initialize)
    }

    /// Reads the endpoint from the environment once, loopback default otherwise.
    pub fn from_env() -> Self {
        Self::new(&RuntimeConfig::from_env())
    }
}

impl<T> RuntimeInterface<T>
where
    T: RuntimeApiTransport + 'static,
{
    pub fn with_connector<F>(endpoint: impl Into<String>, connector: F) -> Self
    where
        F: Fn(&str, &str) -> RuntimeClientResult<RuntimeApiClient<T>> + Send + Sync + 'static,
    {
        Self {
            endpoint: endpoint.into(),
            connector: Arc::new(connector),
            client: None,
            state: ClientState::Uninitialized,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    /// Creates the client handle. A handle that already exists is never
    /// silently replaced; call [`RuntimeInterface::reset`] first.
    pub fn initialize(&mut self, user_agent: &str) -> RuntimeClientResult<()> {
        if self.client.is_some() {
            return Err(RuntimeClientError::AlreadyInitialized);
        }
        let client = (self.connector)(&self.endpoint, user_agent)?;
        self.client = Some(client);
        self.state = ClientState::Initialized;
        tracing::debug!(endpoint = %self.endpoint, "runtime interface initialized");
        Ok(())
    }

    /// Drops the current handle and its connections. Returns whether one existed.
    pub fn reset(&mut self) -> bool {
        self.state = ClientState::Uninitialized;
        self.client.take().is_some()
    }

    pub fn client(&self) -> RuntimeClientResult<&RuntimeApiClient<T>> {
        self.client
            .as_ref()
            .ok_or(RuntimeClientError::NotInitialized)
    }

    /// Waits for the next invocation and returns its payload and metadata map.
    pub async fn next(
        &mut self,
        guard: &mut ContextGuard,
    ) -> RuntimeClientResult<(Vec<u8>, Map<String, Value>)> {
        let invocation = self.next_invocation(guard).await?;
        let metadata = invocation.metadata();
        Ok((invocation.payload, metadata))
    }

    /// Like [`RuntimeInterface::next`], keeping the typed record.
    pub async fn next_invocation(
        &mut self,
        guard: &mut ContextGuard,
    ) -> RuntimeClientResult<InvocationRequest> {
        let client = self.client()?.clone();
        self.state = ClientState::Polling;

        let poll = async move { client.poll_next().await };
        let outcome = guard.suspend(poll).await;

        let result = outcome.unwrap_or_else(|join_error| {
            Err(RuntimeClientError::transport(
                next_invocation_path(),
                format!("poll worker failed: {join_error}"),
            ))
        });
        self.state = match &result {
            Ok(_) => ClientState::PollSucceeded,
            Err(_) => ClientState::Initialized,
        };
        result
    }

    pub async fn post_result(
        &mut self,
        request_id: &str,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> RuntimeClientResult<()> {
        self.post_invocation_result(&InvocationResult::new(request_id, body, content_type))
            .await
    }

    pub async fn post_invocation_result(
        &mut self,
        result: &InvocationResult,
    ) -> RuntimeClientResult<()> {
        let outcome = self.client()?.post_success(result).await;
        self.state = ClientState::Initialized;
        outcome
    }

    pub async fn post_error(
        &mut self,
        request_id: &str,
        error_body: impl Into<Vec<u8>>,
        error_type: &str,
    ) -> RuntimeClientResult<()> {
        self.post_invocation_error(&InvocationError::new(request_id, error_body, error_type))
            .await
    }

    pub async fn post_invocation_error(
        &mut self,
        error: &InvocationError,
    ) -> RuntimeClientResult<()> {
        let outcome = self.client()?.post_failure(error).await;
        self.state = ClientState::Initialized;
        outcome
    }

    pub async fn post_init_error(
        &self,
        error_body: impl Into<Vec<u8>>,
        error_type: &str,
    ) -> RuntimeClientResult<()> {
        self.client()?
            .post_init_error(&RuntimeFailure::new(error_body, error_type))
            .await
    }

    /// Waits on `restore/next` with the execution context released.
    pub async fn restore_next(&mut self, guard: &mut ContextGuard) -> RuntimeClientResult<()> {
        let client = self.client()?.clone();
        let wait = async move { client.restore_next().await };
        let outcome = guard.suspend(wait).await;
        outcome.unwrap_or_else(|join_error| {
            Err(RuntimeClientError::transport(
                restore_next_path(),
                format!("restore worker failed: {join_error}"),
            ))
        })
    }

    pub async fn post_restore_error(
        &self,
        error_body: impl Into<Vec<u8>>,
        error_type: &str,
    ) -> RuntimeClientResult<()> {
        self.client()?
            .post_restore_error(&RuntimeFailure::new(error_body, error_type))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::validate_user_agent;
    use crate::bridge::ExecutionContext;
    use crate::errors::ErrorKind;
    use crate::testing::{MockRuntimeApi, QueuedInvocation};

    const AGENT: &str = "aws-lambda-rust/0.1.0";

    fn mock_interface(mock: &MockRuntimeApi) -> RuntimeInterface<MockRuntimeApi> {
        let mock = mock.clone();
        RuntimeInterface::with_connector("127.0.0.1:9001", move |endpoint, user_agent| {
            validate_user_agent(user_agent)?;
            Ok(RuntimeApiClient::with_transport(endpoint, mock.clone()))
        })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn calls_before_initialize_fail_without_network() {
        let mock = MockRuntimeApi::new();
        let mut interface = mock_interface(&mock);
        let context = ExecutionContext::new();
        let mut guard = context.enter().await;

        let next = interface
            .next(&mut guard)
            .await
            .expect_err("not initialized");
        let result = interface
            .post_result("abc123", "world", "text/plain")
            .await
            .expect_err("not initialized");
        let error = interface
            .post_error("abc123", "boom", "Runtime.Unknown")
            .await
            .expect_err("not initialized");

        for failure in [next, result, error] {
            assert_eq!(failure.kind(), ErrorKind::NotInitialized);
        }
        assert_eq!(interface.state(), ClientState::Uninitialized);
        assert!(guard.is_held());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn second_initialize_is_rejected_until_reset() {
        let mock = MockRuntimeApi::new();
        let mut interface = mock_interface(&mock);

        interface.initialize(AGENT).expect("first initialize");
        let error = interface.initialize(AGENT).expect_err("second call");
        assert_eq!(error.kind(), ErrorKind::AlreadyInitialized);

        assert!(interface.reset());
        assert_eq!(interface.state(), ClientState::Uninitialized);
        interface.initialize(AGENT).expect("reinitialize");
        assert_eq!(interface.state(), ClientState::Initialized);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blank_user_agent_leaves_interface_uninitialized() {
        let mock = MockRuntimeApi::new();
        let mut interface = mock_interface(&mock);

        let error = interface.initialize("").expect_err("blank agent");
        assert_eq!(error.kind(), ErrorKind::Initialization);
        assert!(!interface.is_initialized());
        assert_eq!(interface.state(), ClientState::Uninitialized);
    }

    #[test]
    fn reqwest_interface_binds_client_to_configured_endpoint() {
        let config = RuntimeConfig::new("localhost:1234", AGENT);
        let mut interface = RuntimeInterface::new(&config);

        interface.initialize(AGENT).expect("initialize");

        let client = interface.client().expect("client should exist");
        assert_eq!(client.endpoint(), "localhost:1234");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn state_follows_poll_and_report_cycle() {
        let mock = MockRuntimeApi::new();
        let mut interface = mock_interface(&mock);
        interface.initialize(AGENT).expect("initialize");
        let context = ExecutionContext::new();
        let mut guard = context.enter().await;

        let queued = QueuedInvocation::new("abc123", "arn:test", 1_700_000_000_000, b"hello");
        mock.push_invocation(queued);
        let (payload, metadata) = interface
            .next(&mut guard)
            .await
            .expect("poll should succeed");
        assert_eq!(payload, b"hello".to_vec());
        assert_eq!(
            metadata.get("Lambda-Runtime-Aws-Request-Id"),
            Some(&Value::String("abc123".to_string()))
        );
        assert_eq!(interface.state(), ClientState::PollSucceeded);

        interface
            .post_result("abc123", "world", "text/plain")
            .await
            .expect("post should succeed");
        assert_eq!(interface.state(), ClientState::Initialized);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_poll_returns_handle_to_initialized() {
        let mock = MockRuntimeApi::new();
        let mut interface = mock_interface(&mock);
        interface.initialize(AGENT).expect("initialize");
        let context = ExecutionContext::new();
        let mut guard = context.enter().await;

        mock.fail_next_request(500, "container error");
        let error = interface
            .next(&mut guard)
            .await
            .expect_err("poll should fail");

        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(interface.state(), ClientState::Initialized);
        assert!(guard.is_held());

        mock.push_invocation(QueuedInvocation::new("abc123", "arn:test", 1, b"{}"));
        interface
            .next(&mut guard)
            .await
            .expect("handle should poll again");
        assert_eq!(interface.state(), ClientState::PollSucceeded);
    }
}
