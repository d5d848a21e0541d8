use sightline_types::TimestampError;
use std::error::Error;
use std::fmt;

/// Failure talking to the control plane. Always logged and dropped by the
/// background paths; only surfaced to callers of explicit refreshes.
#[derive(Debug)]
pub enum BackendError {
    Transport {
        url: String,
        message: String,
    },
    UnexpectedStatus {
        url: String,
        status: u16,
    },
    Decode {
        url: String,
        message: String,
    },
    Encode {
        what: &'static str,
        message: String,
    },
    InvalidBreakpoint {
        id: String,
        source: TimestampError,
    },
    TaskFailed {
        message: String,
    },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { url, message } => write!(f, "request to {url} failed: {message}"),
            Self::UnexpectedStatus { url, status } => {
                write!(f, "unexpected status {status} from {url}")
            }
            Self::Decode { url, message } => write!(f, "failed to decode response from {url}: {message}"),
            Self::Encode { what, message } => write!(f, "failed to encode {what}: {message}"),
            Self::InvalidBreakpoint { id, source } => {
                write!(f, "breakpoint {id} is malformed: {source}")
            }
            Self::TaskFailed { message } => write!(f, "background request task failed: {message}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBreakpoint { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingApiKey,
    MissingServiceName,
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },
    NoRuntime,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "an API key is required"),
            Self::MissingServiceName => write!(f, "a service name is required"),
            Self::InvalidSetting { key, value, reason } => {
                write!(f, "invalid value {value:?} for {key}: {reason}")
            }
            Self::NoRuntime => write!(
                f,
                "no tokio runtime available; create the client from within a runtime or pass a handle"
            ),
        }
    }
}

impl Error for ConfigError {}
