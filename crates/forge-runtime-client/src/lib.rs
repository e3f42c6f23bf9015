#![doc = r#"
Client half of the serverless runtime API control-plane protocol.

Operation mapping:

| Client method | Runtime API | Notes |
| --- | --- | --- |
| `RuntimeApiClient::poll_next` | `GET /2018-06-01/runtime/invocation/next` | long-poll, no client timeout |
| `RuntimeApiClient::post_success` | `POST /2018-06-01/runtime/invocation/{id}/response` | body + `Content-Type` |
| `RuntimeApiClient::post_failure` | `POST /2018-06-01/runtime/invocation/{id}/error` | `application/json` + `Lambda-Runtime-Function-Error-Type` |
| `RuntimeApiClient::post_init_error` | `POST /2018-06-01/runtime/init/error` | before the first poll |
| `RuntimeApiClient::restore_next` | `GET /2018-06-01/runtime/restore/next` | after a snapshot restore |
| `RuntimeApiClient::post_restore_error` | `POST /2018-06-01/runtime/restore/error` | |

Implementation notes:
- Request ids stay opaque `String` values; they are only percent-encoded into the path.
- Empty optional headers decode as `None`, never as `Some("")`.
- `RuntimeInterface` owns the handle lifecycle and releases the caller's
  `ExecutionContext` only around the two waits (`next`, `restore_next`).
- Nothing retries. Every failure reaches the caller as a `RuntimeClientError`
  whose `ErrorKind` picks the recovery path.
"#]

pub mod adapter;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod errors;
pub mod interface;
pub mod records;
pub mod runtime;
pub mod testing;

pub use adapter::{ReqwestRuntimeTransport, RuntimeApiTransport, validate_user_agent};
pub use bridge::{ContextGuard, ExecutionContext};
pub use codec::{WireRequest, WireResponse};
pub use config::{DEFAULT_RUNTIME_API_ENDPOINT, RUNTIME_API_ENV, RuntimeConfig, default_user_agent};
pub use errors::{ErrorKind, RuntimeClientError, RuntimeClientResult};
pub use interface::{ClientState, RuntimeInterface};
pub use records::{InvocationError, InvocationRequest, InvocationResult, RequestId, RuntimeFailure};
pub use runtime::RuntimeApiClient;
pub use testing::{MockCompletion, MockRuntimeApi, QueuedInvocation};
