use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use forge_runtime_client::{
    ClientState, ExecutionContext, MockRuntimeApi, QueuedInvocation, RuntimeApiClient,
    RuntimeInterface, validate_user_agent,
};

fn mock_interface(mock: &MockRuntimeApi) -> RuntimeInterface<MockRuntimeApi> {
    let mock = mock.clone();
    let connector = move |endpoint: &str, user_agent: &str| {
        validate_user_agent(user_agent)?;
        Ok(RuntimeApiClient::with_transport(endpoint, mock.clone()))
    };
    let mut interface = RuntimeInterface::with_connector("127.0.0.1:9001", connector);
    interface
        .initialize("aws-lambda-rust/test")
        .expect("initialize should succeed");
    interface
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn other_work_progresses_while_poll_is_outstanding() {
    let mock = MockRuntimeApi::new();
    let mut interface = mock_interface(&mock);
    let context = ExecutionContext::new();
    let progressed = Arc::new(AtomicUsize::new(0));
    let mut guard = context.enter().await;

    let ticker = {
        let context = context.clone();
        let progressed = Arc::clone(&progressed);
        let mock = mock.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                let _guard = context.enter().await;
                progressed.fetch_add(1, Ordering::SeqCst);
            }
            mock.push_invocation(QueuedInvocation::new(
                "abc123",
                "arn:test",
                1_700_000_000_000,
                b"hello",
            ));
        })
    };

    assert_eq!(progressed.load(Ordering::SeqCst), 0);
    let (payload, _) = tokio::time::timeout(Duration::from_secs(5), interface.next(&mut guard))
        .await
        .expect("poll should not deadlock")
        .expect("poll should succeed");

    assert_eq!(payload, b"hello".to_vec());
    assert_eq!(progressed.load(Ordering::SeqCst), 3);
    assert!(guard.is_held());
    assert!(context.try_enter().is_none());
    ticker.await.expect("ticker should finish");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restore_next_releases_context_and_reports_success() {
    let mock = MockRuntimeApi::new();
    let mut interface = mock_interface(&mock);
    let context = ExecutionContext::new();
    let mut guard = context.enter().await;

    interface
        .restore_next(&mut guard)
        .await
        .expect("restore should succeed");
    interface
        .post_restore_error("{}", "Runtime.RestoreHookFailed")
        .await
        .expect("restore error should post");

    assert!(guard.is_held());
    let failures = mock.runtime_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "restore");
    assert_eq!(failures[0].1, "Runtime.RestoreHookFailed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_cycle_records_completion_on_control_plane() {
    let mock = MockRuntimeApi::new();
    let mut interface = mock_interface(&mock);
    let context = ExecutionContext::new();
    let mut guard = context.enter().await;

    for (index, request_id) in ["first", "second"].into_iter().enumerate() {
        mock.push_invocation(
            QueuedInvocation::new(request_id, "arn:test", 1_700_000_000_000, b"{}")
                .with_trace_id(format!("Root=1-trace-{index}")),
        );
        let invocation = interface
            .next_invocation(&mut guard)
            .await
            .expect("poll should succeed");
        assert_eq!(invocation.request_id, request_id);
        assert_eq!(
            invocation.trace_id.as_deref(),
            Some(format!("Root=1-trace-{index}").as_str())
        );

        interface
            .post_result(&invocation.request_id, "{\"ok\":true}", "application/json")
            .await
            .expect("post should succeed");
        assert_eq!(interface.state(), ClientState::Initialized);
    }

    let first = mock.completed("first").expect("first completed");
    assert_eq!(first.body, b"{\"ok\":true}".to_vec());
    assert_eq!(first.content_type.as_deref(), Some("application/json"));
    assert!(mock.completed("second").is_some());
}
