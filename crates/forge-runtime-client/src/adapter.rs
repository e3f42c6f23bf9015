use async_trait::async_trait;
use reqwest::header::{HeaderValue, USER_AGENT};

use crate::codec::{WireRequest, WireResponse};
use crate::config::base_url_for;
use crate::errors::{RuntimeClientError, RuntimeClientResult};

/// Moves one request to the control plane and brings back its response.
///
/// Implementations report connection and IO failures as
/// [`RuntimeClientError::Transport`] and hand back every HTTP status, success or
/// not, as a [`WireResponse`]. Status interpretation belongs to the client.
#[async_trait]
pub trait RuntimeApiTransport: Send + Sync {
    async fn send(&self, request: WireRequest) -> RuntimeClientResult<WireResponse>;
}

#[async_trait]
impl<T> RuntimeApiTransport for std::sync::Arc<T>
where
    T: RuntimeApiTransport + ?Sized,
{
    async fn send(&self, request: WireRequest) -> RuntimeClientResult<WireResponse> {
        (**self).send(request).await
    }
}

/// HTTP transport backed by `reqwest`.
///
/// No request timeout is configured: `invocation/next` is held open by the
/// control plane until work arrives.
#[derive(Clone, Debug)]
pub struct ReqwestRuntimeTransport {
    client: reqwest::Client,
    base_url: String,
    user_agent: HeaderValue,
}

impl ReqwestRuntimeTransport {
    pub fn new(endpoint: &str, user_agent: &str) -> RuntimeClientResult<Self> {
        let user_agent = validate_user_agent(user_agent)?;
        if endpoint.trim().is_empty() {
            return Err(RuntimeClientError::Initialization(
                "runtime API endpoint is empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RuntimeClientError::Initialization(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url_for(endpoint),
            user_agent,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RuntimeApiTransport for ReqwestRuntimeTransport {
    async fn send(&self, request: WireRequest) -> RuntimeClientResult<WireResponse> {
        let WireRequest {
            method,
            path,
            headers,
            body,
        } = request;

        let mut builder = self
            .client
            .request(method.clone(), self.url(&path))
            .headers(headers)
            .header(USER_AGENT, self.user_agent.clone());
        if !body.is_empty() || method == reqwest::Method::POST {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| {
            RuntimeClientError::transport(&path, format!("http {method} failed: {err}"))
        })?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| {
            RuntimeClientError::transport(&path, format!("http read body failed: {err}"))
        })?;

        Ok(WireResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// A user agent must be non-empty and usable as a header value.
pub fn validate_user_agent(user_agent: &str) -> RuntimeClientResult<HeaderValue> {
    if user_agent.trim().is_empty() {
        return Err(RuntimeClientError::Initialization("user agent is missing".to_string()));
    }
    HeaderValue::from_str(user_agent).map_err(|_| {
        let detail = format!("user agent is not a valid header value: {user_agent:?}");
        RuntimeClientError::Initialization(detail)
    })
}
