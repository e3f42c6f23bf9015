use thiserror::Error;

/// Coarse classification of a [`RuntimeClientError`], for callers that pick a
/// recovery path per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Initialization,
    NotInitialized,
    AlreadyInitialized,
    Transport,
    Protocol,
}

#[derive(Debug, Error)]
pub enum RuntimeClientError {
    #[error("runtime client initialization failed: {0}")]
    Initialization(String),
    #[error("runtime client not yet initialized")]
    NotInitialized,
    #[error("runtime client already initialized")]
    AlreadyInitialized,
    #[error("request to runtime endpoint '{endpoint}' failed{}: {detail}", status_suffix(.status))]
    Transport {
        endpoint: String,
        status: Option<u16>,
        detail: String,
    },
    #[error("runtime endpoint '{endpoint}' returned an unusable response: {detail}")]
    Protocol { endpoint: String, detail: String },
}

pub type RuntimeClientResult<T> = Result<T, RuntimeClientError>;

impl RuntimeClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    pub fn transport(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn transport_status(
        endpoint: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            status: Some(status),
            detail: body.into(),
        }
    }

    pub fn protocol(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// HTTP status reported by the control plane, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}
