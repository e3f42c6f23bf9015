pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
pub const DEFAULT_RUNTIME_API_ENDPOINT: &str = "127.0.0.1:9001";

/// Where the control plane lives and how this runtime introduces itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub endpoint: String,
    pub user_agent: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RUNTIME_API_ENDPOINT.to_string(),
            user_agent: default_user_agent(),
        }
    }
}

impl RuntimeConfig {
    pub fn new(endpoint: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: user_agent.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Blank values fall back
    /// to the loopback default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(RUNTIME_API_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_RUNTIME_API_ENDPOINT.to_string());
        Self {
            endpoint,
            user_agent: default_user_agent(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Base URL for requests. A bare `host:port` endpoint is spoken to over
    /// plain HTTP.
    pub fn base_url(&self) -> String {
        base_url_for(&self.endpoint)
    }
}

pub fn default_user_agent() -> String {
    format!("aws-lambda-rust/{}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn base_url_for(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
