//! Transport abstraction.
//!
//! A transport is an injected capability, not something this crate
//! implements: it must deliver [`Envelope`]s to the remote peer and, if it
//! supports receiving, push incoming envelopes into a registered handler.
//! Correlation, timeouts, and dispatch are handled by the endpoint layer.
//!
//! The in-memory pair in [`memory_pair`] serves as the reference
//! implementation of these semantics.

mod memory;

pub use memory::memory_pair;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::protocol::Envelope;
use crate::Result;

/// Boxed future, the shape in which handler results cross the transport
/// boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased handler invoked by a transport for each incoming envelope.
///
/// Wrapped in `Arc` for cheap cloning into transport internals.
pub type EnvelopeHandler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Transport capability contract.
///
/// `send` is the one required capability; receiving is optional. A transport
/// that cannot push incoming envelopes (for example a write-only pipe)
/// simply keeps the default [`register_handler`](Transport::register_handler)
/// implementation, which declines registration. Endpoints surface the absence
/// of a capability as [`Error::Configuration`](crate::Error::Configuration)
/// when an operation needs it.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show
/// explicit lifetimes and a boxed `Future`. Consumers should treat `send`
/// as a normal `async fn`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Deliver one envelope to the remote peer.
    ///
    /// # Errors
    ///
    /// Delivery failures propagate to the caller; the endpoint guarantees
    /// that a failed request send leaves no pending-request entry behind.
    async fn send(&self, env: Envelope) -> Result<()>;

    /// Register the handler to be invoked for each incoming envelope.
    ///
    /// Returns `true` when the transport accepted the handler. The default
    /// implementation declines, declaring the transport send-only.
    fn register_handler(&self, _handler: EnvelopeHandler) -> bool {
        false
    }

    /// Remove the currently registered handler, if any.
    fn unregister_handler(&self) {}
}

/// Shared transport pointer.
///
/// An `Arc<dyn Transport>`: cheap to clone, shared across endpoint clones,
/// erases the concrete transport behind a stable interface.
pub type TransportPtr = Arc<dyn Transport>;
