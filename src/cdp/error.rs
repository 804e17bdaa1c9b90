use std::fmt;

/// Errors produced by the CDP client runtime and the page layer on top of it.
#[derive(Debug)]
pub enum CdpError {
    /// HTTP discovery or the WebSocket dial failed.
    ConnectFailed(String),

    /// Read or write on an established connection failed; the connection is
    /// permanently unusable and every pending request was drained with this.
    TransportLost(String),

    /// The browser answered a command with a CDP `error` object.
    Protocol {
        /// The CDP error code (e.g. -32000).
        code: i64,
        /// The CDP error message, verbatim.
        message: String,
    },

    /// A result's shape did not match what the operation declared.
    Parse(String),

    /// A selector matched nothing, a target id is unknown, or an index is
    /// out of range.
    NotFound(String),

    /// The caller supplied malformed input (bad key name, bad cookie, bad
    /// coordinate).
    InvalidArgument(String),

    /// A deadline elapsed before a command response or wait condition.
    Timeout {
        /// What was being waited for.
        what: String,
    },

    /// The transport task is gone (its channel closed underneath us).
    Internal(String),
}

impl fmt::Display for CdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "connect failed: {msg}"),
            Self::TransportLost(msg) => write!(f, "connection lost: {msg}"),
            Self::Protocol { code, message } => {
                write!(f, "protocol error ({code}): {message}")
            }
            Self::Parse(msg) => write!(f, "unexpected response shape: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Timeout { what } => write!(f, "timed out waiting for {what}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CdpError {}

impl CdpError {
    /// Shorthand for a timeout on a named condition.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }
}

impl From<CdpError> for crate::error::AppError {
    fn from(e: CdpError) -> Self {
        use crate::error::ExitCode;
        let code = match &e {
            CdpError::ConnectFailed(_) | CdpError::TransportLost(_) => ExitCode::ConnectionError,
            CdpError::Timeout { .. } => ExitCode::TimeoutError,
            CdpError::Protocol { .. }
            | CdpError::Parse(_)
            | CdpError::NotFound(_)
            | CdpError::InvalidArgument(_)
            | CdpError::Internal(_) => ExitCode::GeneralError,
        };
        Self {
            message: e.to_string(),
            code,
        }
    }
}
