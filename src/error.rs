use thiserror::Error;

/// Errors that can occur during RPC operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required transport capability is missing for the attempted action.
    ///
    /// Never retried; surfaced synchronously to the caller.
    #[error("cannot {action}: {missing} is not configured")]
    Configuration {
        /// The missing capability, named (e.g. "a transport `send` capability").
        missing: &'static str,
        /// The action that was attempted.
        action: &'static str,
    },

    /// Request timed out waiting for a response
    #[error("request timed out")]
    Timeout,

    /// Remote handler reported failure; carries the remote-supplied message
    #[error("{0}")]
    Application(String),

    /// No handler registered for the requested method
    #[error("no handler found for method: {0}")]
    NoHandler(String),

    /// Malformed or unrecognized envelope
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level delivery failure
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, Error>;
