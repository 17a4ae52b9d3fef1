//! In-memory transport implementation.
//!
//! Provides a pure in-process pair of cross-wired [`Transport`] halves,
//! intended for testing, local execution, and as a reference for transport
//! semantics.
//!
//! ## Reference Semantics
//!
//! - `send` on one half invokes the handler registered on the other half,
//!   awaiting its completion, so delivery is deterministic within a process.
//! - An envelope sent while the peer has no registered handler is dropped
//!   (logged at debug). This is exactly what happens to a response arriving
//!   on a transport an endpoint has rebound away from.
//! - Handler errors propagate back through `send`, so a serving-side failure
//!   is observable to the sending test.
//!
//! ## Non-Goals
//!
//! No emulation of broker failure modes, persistence, or delivery
//! guarantees. One pair connects exactly two peers.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::endpoint::lock_ignore_poison;
use crate::protocol::Envelope;
use crate::transport::{EnvelopeHandler, Transport, TransportPtr};
use crate::Result;

/// One peer's receive slot. Shared between the two halves of a pair.
struct HandlerSlot {
    handler: Mutex<Option<EnvelopeHandler>>,
}

impl HandlerSlot {
    fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            handler: Mutex::new(None),
        })
    }
}

/// One half of an in-memory transport pair.
///
/// Registers handlers into its own slot and sends into the peer's slot.
struct MemoryTransport {
    // ---
    name: &'static str,
    local: Arc<HandlerSlot>,
    peer: Arc<HandlerSlot>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    async fn send(&self, env: Envelope) -> Result<()> {
        // Clone the handler out of the lock before awaiting it.
        let handler = lock_ignore_poison(&self.peer.handler).clone();

        match handler {
            Some(handler) => handler(env).await,
            None => {
                debug!(side = self.name, "envelope dropped: peer has no handler");
                Ok(())
            }
        }
    }

    fn register_handler(&self, handler: EnvelopeHandler) -> bool {
        // ---
        *lock_ignore_poison(&self.local.handler) = Some(handler);
        true
    }

    fn unregister_handler(&self) {
        // ---
        lock_ignore_poison(&self.local.handler).take();
    }
}

/// Create a connected pair of in-memory transports.
///
/// Envelopes sent on the left half are delivered to the handler registered
/// on the right half, and vice versa. Each call creates an independent pair;
/// there is no process-global bus, so parallel tests do not interfere.
///
/// # Example
///
/// ```
/// use peer_rpc::{memory_pair, RpcConfig, RpcEndpoint};
///
/// let (left, right) = memory_pair();
///
/// let a = RpcEndpoint::new(RpcConfig::default());
/// a.set_transport(Some(left));
///
/// let b = RpcEndpoint::new(RpcConfig::default());
/// b.set_transport(Some(right));
/// ```
pub fn memory_pair() -> (TransportPtr, TransportPtr) {
    // ---
    let left_slot = HandlerSlot::new();
    let right_slot = HandlerSlot::new();

    let left = MemoryTransport {
        name: "left",
        local: left_slot.clone(),
        peer: right_slot.clone(),
    };
    let right = MemoryTransport {
        name: "right",
        local: right_slot,
        peer: left_slot,
    };

    (Arc::new(left), Arc::new(right))
}
