use thiserror::Error;

/// Failure of a single JSON-RPC exchange with a node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// How a failure should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Bad request or params; retrying the same call will not help.
    Client,
    /// Node or network failure; another attempt or provider may succeed.
    Provider,
    /// Rate limited (-32005).
    RateLimit,
    /// Call executed and reverted.
    Execution,
}

impl RpcError {
    pub fn category(&self) -> RpcErrorCategory {
        match self {
            Self::InvalidEndpoint(_) => RpcErrorCategory::Client,
            Self::Transport(_) | Self::InvalidResponse(_) => RpcErrorCategory::Provider,
            Self::Http(429) => RpcErrorCategory::RateLimit,
            Self::Http(status) if (400..500).contains(status) => RpcErrorCategory::Client,
            Self::Http(_) => RpcErrorCategory::Provider,
            Self::Rpc { code, message } => classify(*code, message),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            RpcErrorCategory::Provider | RpcErrorCategory::RateLimit
        )
    }

    pub(crate) fn transport(error: &reqwest::Error) -> Self {
        let reason = if error.is_connect() {
            "connection refused or unreachable"
        } else if error.is_timeout() {
            "connection timed out"
        } else if error.is_decode() {
            "response decode error"
        } else if error.is_body() {
            "response body error"
        } else {
            "request failed"
        };
        Self::Transport(reason.to_string())
    }
}

fn classify(code: i64, message: &str) -> RpcErrorCategory {
    match code {
        -32602..=-32600 => RpcErrorCategory::Client,
        -32005 => RpcErrorCategory::RateLimit,
        3 => RpcErrorCategory::Execution,
        -32099..=-32000 => {
            let message = message.to_lowercase();
            if message.contains("revert") || message.contains("out of gas") {
                RpcErrorCategory::Execution
            } else {
                RpcErrorCategory::Provider
            }
        }
        _ => RpcErrorCategory::Provider,
    }
}
