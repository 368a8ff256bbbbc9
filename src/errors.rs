//! Error types for the sensor monitor

use std::fmt;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug)]
pub enum MonitorError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP request failed before a response arrived
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// Timeout, non-success status or unusable payload from a remote endpoint
    Transport(String),

    /// Credentials rejected by the login endpoint
    Auth(String),

    /// Sensor id not registered with the monitor
    UnknownSensor(String),

    /// Generic error with message
    Other(String),
}

impl MonitorError {
    /// Errors the poll loop absorbs as "no update this cycle".
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MonitorError::Http(_) | MonitorError::Transport(_) | MonitorError::Json(_)
        )
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Io(err) => write!(f, "IO error: {}", err),
            MonitorError::Http(err) => write!(f, "HTTP error: {}", err),
            MonitorError::Json(err) => write!(f, "JSON error: {}", err),
            MonitorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MonitorError::Transport(msg) => write!(f, "Transport error: {}", msg),
            MonitorError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            MonitorError::UnknownSensor(id) => write!(f, "Unknown sensor: {}", id),
            MonitorError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Io(err) => Some(err),
            MonitorError::Http(err) => Some(err),
            MonitorError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Http(err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Json(err)
    }
}
