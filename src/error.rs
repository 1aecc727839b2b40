//! Error types for zero-mariasql.

use std::time::Duration;

use thiserror::Error;

/// Result type for zero-mariasql operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Client error codes that mean the transport is gone.
///
/// - 2006: server has gone away
/// - 2013: lost connection during query
/// - 2055: lost connection (system error)
const DEAD_CONNECTION_CODES: [u16; 3] = [2006, 2013, 2055];

/// `ER_QUERY_INTERRUPTED`, reported for a statement killed with `KILL QUERY`.
const QUERY_INTERRUPTED: u16 = 1317;

/// An error reported by the server or by the connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// MySQL/MariaDB error number
    pub code: u16,
    /// Human readable message
    pub message: String,
    /// SQLSTATE (5 characters), when the handle knows it
    pub sqlstate: Option<String>,
}

impl ServerError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sqlstate: None,
        }
    }

    /// Returns true if this error code means the connection is dead.
    pub fn is_dead_connection(&self) -> bool {
        DEAD_CONNECTION_CODES.contains(&self.code)
    }

    /// Returns true if the statement was interrupted by `KILL QUERY`.
    pub fn is_query_interrupted(&self) -> bool {
        self.code == QUERY_INTERRUPTED
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (errno {}", self.message, self.code)?;
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, ", SQLSTATE {}", sqlstate)?;
        }
        write!(f, ")")
    }
}

/// Error type for zero-mariasql.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A single statement failed
    #[error("Server error: {0}")]
    Server(ServerError),

    /// The connection failed and was closed
    #[error("Connection error: {0}")]
    Connection(ServerError),

    /// The connection closed before the query could finish
    #[error("Connection closed early")]
    ClosedEarly,

    /// No ping acknowledgment arrived in time
    #[error("Ping lost: no response within {0:?}")]
    PingLost(Duration),

    /// Operation needs an established connection
    #[error("Not connected")]
    NotConnected,

    /// Invalid usage (e.g., aborting with no query in progress)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// The client's driver task is gone
    #[error("Client is shut down")]
    Shutdown,
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Connection(_) | Error::ClosedEarly | Error::PingLost(_) => true,
            Error::Server(err) => err.is_dead_connection(),
            _ => false,
        }
    }

    /// Returns true if the statement was killed by an abort.
    pub fn is_query_interrupted(&self) -> bool {
        matches!(self, Error::Server(err) if err.is_query_interrupted())
    }

    /// Get the server error number, if any.
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Server(err) | Error::Connection(err) => Some(err.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_connection_codes() {
        assert!(ServerError::new(2006, "gone away").is_dead_connection());
        assert!(ServerError::new(2013, "lost").is_dead_connection());
        assert!(!ServerError::new(1064, "syntax").is_dead_connection());
    }

    #[test]
    fn test_connection_broken() {
        assert!(Error::ClosedEarly.is_connection_broken());
        assert!(Error::Server(ServerError::new(2055, "lost")).is_connection_broken());
        assert!(!Error::Server(ServerError::new(1146, "no table")).is_connection_broken());
        assert!(!Error::NotConnected.is_connection_broken());
    }

    #[test]
    fn test_display() {
        let mut err = ServerError::new(1064, "You have an error in your SQL syntax");
        err.sqlstate = Some("42000".into());
        assert_eq!(
            Error::Server(err).to_string(),
            "Server error: You have an error in your SQL syntax (errno 1064, SQLSTATE 42000)"
        );
    }
}
