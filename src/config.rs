//! Public, transport-agnostic RPC configuration.
//!
//! This type intentionally contains no transport-specific concepts.
//! Transports are injected separately via
//! [`RpcEndpoint::set_transport`](crate::RpcEndpoint::set_transport).

use std::time::Duration;

/// Default maximum time to wait for a response to a request.
pub const DEFAULT_MAX_REQUEST_TIME: Duration = Duration::from_millis(1000);

/// Default ceiling for request id allocation.
///
/// Ids wrap back to 1 after reaching this value. The ceiling vastly exceeds
/// realistic concurrency, so wrap-around never reuses an outstanding id in
/// practice, but that is not formally enforced.
pub const DEFAULT_MAX_REQUEST_ID: u64 = 10_000_000_000;

/// Per-endpoint configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Timeout applied to each outstanding request independently.
    ///
    /// `None` disables the timeout entirely: a request then waits until a
    /// response arrives or the endpoint is dropped.
    pub max_request_time: Option<Duration>,

    /// Request id ceiling; allocation wraps back to 1 past this value.
    pub max_request_id: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        // ---
        Self {
            max_request_time: Some(DEFAULT_MAX_REQUEST_TIME),
            max_request_id: DEFAULT_MAX_REQUEST_ID,
        }
    }
}

impl RpcConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use peer_rpc::RpcConfig;
    /// use std::time::Duration;
    ///
    /// let config = RpcConfig::new().with_max_request_time(Duration::from_secs(5));
    /// ```
    pub fn with_max_request_time(mut self, timeout: Duration) -> Self {
        self.max_request_time = Some(timeout);
        self
    }

    /// Disable the request timeout entirely.
    ///
    /// Requests then wait indefinitely for a response. Use with care:
    /// timeout is the only cancellation mechanism for pending requests.
    pub fn without_request_timeout(mut self) -> Self {
        self.max_request_time = None;
        self
    }

    /// Set the request id ceiling.
    ///
    /// Mostly useful in tests that exercise wrap-around behavior.
    pub fn with_max_request_id(mut self, ceiling: u64) -> Self {
        self.max_request_id = ceiling;
        self
    }
}
