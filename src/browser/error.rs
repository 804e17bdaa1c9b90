use std::fmt;

/// Errors produced while locating, probing, or launching a browser.
#[derive(Debug)]
pub enum BrowserError {
    /// No browser executable could be located.
    NotFound(String),

    /// The browser process could not be spawned, or exited before becoming
    /// ready.
    LaunchFailed(String),

    /// The readiness probe expired before the debug port opened.
    StartupTimeout {
        port: u16,
    },

    /// HTTP request to the debugging endpoint failed.
    Http(String),

    /// A response from the debugging endpoint could not be parsed.
    Parse(String),

    Io(std::io::Error),
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "browser not found: {msg}"),
            Self::LaunchFailed(msg) => write!(f, "browser launch failed: {msg}"),
            Self::StartupTimeout { port } => {
                write!(f, "browser did not open debug port {port} in time")
            }
            Self::Http(msg) => write!(f, "debug endpoint error: {msg}"),
            Self::Parse(msg) => write!(f, "debug endpoint parse error: {msg}"),
            Self::Io(e) => write!(f, "browser I/O error: {e}"),
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BrowserError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<BrowserError> for crate::error::AppError {
    fn from(e: BrowserError) -> Self {
        use crate::error::ExitCode;
        let code = match &e {
            BrowserError::NotFound(_)
            | BrowserError::LaunchFailed(_)
            | BrowserError::Parse(_)
            | BrowserError::Io(_) => ExitCode::GeneralError,
            BrowserError::Http(_) => ExitCode::ConnectionError,
            BrowserError::StartupTimeout { .. } => ExitCode::TimeoutError,
        };
        Self {
            message: e.to_string(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let err = BrowserError::NotFound("set HUBCAP_CHROME or --chrome-path".into());
        assert_eq!(
            err.to_string(),
            "browser not found: set HUBCAP_CHROME or --chrome-path"
        );
    }

    #[test]
    fn display_startup_timeout() {
        let err = BrowserError::StartupTimeout { port: 9222 };
        assert_eq!(
            err.to_string(),
            "browser did not open debug port 9222 in time"
        );
    }

    #[test]
    fn startup_timeout_maps_to_timeout_exit_code() {
        let app: crate::error::AppError = BrowserError::StartupTimeout { port: 1 }.into();
        assert_eq!(app.code, crate::error::ExitCode::TimeoutError);
    }

    #[test]
    fn http_maps_to_connection_exit_code() {
        let app: crate::error::AppError = BrowserError::Http("refused".into()).into();
        assert_eq!(app.code, crate::error::ExitCode::ConnectionError);
    }

    #[test]
    fn source_returns_io_error() {
        let err: &dyn std::error::Error = &BrowserError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        assert!(err.source().is_some());
    }
}
