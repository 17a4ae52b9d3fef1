//! RPC endpoint: correlation, dispatch, and fan-out.
//!
//! # Architecture
//!
//! One [`RpcEndpoint`] owns all correlation state for one peer connection:
//! the pending-request registry, the request handler configuration, and the
//! message subscription registries. The transport is an injected capability;
//! on [`set_transport`](RpcEndpoint::set_transport) the endpoint registers
//! its envelope router as the transport's receive handler.
//!
//! Incoming envelopes flow through [`handle_envelope`](RpcEndpoint::handle_envelope),
//! which is pure dispatch: a request is served and answered with exactly one
//! response, a response settles the matching pending request, a message fans
//! out to subscribers. The router holds no state of its own.
//!
//! # Concurrency
//!
//! Multiple requests can be in flight simultaneously; they are independent
//! registry entries matched purely by id, so responses may arrive out of
//! order and still settle the correct caller. All shared state sits behind
//! `std::sync::Mutex` guards that are never held across an `.await`.

mod dispatch;
mod hub;
mod pending;

pub use dispatch::{DirectFn, MethodFn, MethodMap, RequestHandler};
pub use hub::{MessageListener, WILDCARD_TOPIC};

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::protocol::{none_if_null, Envelope, RequestId};
use crate::transport::{BoxFuture, EnvelopeHandler, TransportPtr};
use crate::{Error, Result};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// Poisoning indicates that another task panicked while holding the lock.
/// The protected state here is correlation bookkeeping with no invariants
/// spanning multiple fields; the worst outcome of continuing is a dropped
/// or unmatched envelope. This also avoids propagating non-`Send` poison
/// errors across async boundaries.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One RPC endpoint: issues requests, serves requests, publishes and
/// receives messages over a caller-supplied transport.
///
/// Cheap to clone (internally `Arc`-backed); clones share all state.
/// Independent endpoints share nothing, so one process can hold one
/// endpoint per peer connection without interference.
///
/// # Example
///
/// ```
/// use peer_rpc::{memory_pair, MethodMap, RpcConfig, RpcEndpoint};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> peer_rpc::Result<()> {
/// let (left, right) = memory_pair();
///
/// let server = RpcEndpoint::new(RpcConfig::default());
/// server.set_transport(Some(right));
/// server.set_request_handler(
///     MethodMap::new()
///         .handle("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
///         .into(),
/// );
///
/// let client = RpcEndpoint::new(RpcConfig::default());
/// client.set_transport(Some(left));
///
/// let sum: i64 = client.request("add", (2, 3)).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    config: RpcConfig,
    transport: Mutex<TransportState>,
    handler: Mutex<Option<Arc<RequestHandler>>>,
    pending: Mutex<pending::PendingRequests>,
    hub: Mutex<hub::MessageHub>,
}

/// The held transport reference plus whether it accepted our receive handler.
#[derive(Default)]
struct TransportState {
    // ---
    transport: Option<TransportPtr>,
    receiving: bool,
}

impl RpcEndpoint {
    // ---
    /// Create an endpoint with no transport and no request handler.
    pub fn new(config: RpcConfig) -> Self {
        // ---
        let pending = pending::PendingRequests::new(config.max_request_id);

        Self {
            inner: Arc::new(Inner {
                config,
                transport: Mutex::new(TransportState::default()),
                handler: Mutex::new(None),
                pending: Mutex::new(pending),
                hub: Mutex::new(hub::MessageHub::new()),
            }),
        }
    }

    /// Swap the active transport.
    ///
    /// Unregisters the envelope router from the outgoing transport (when it
    /// had accepted a handler), switches the held reference, and registers
    /// the router on the new transport. The router is held through a weak
    /// reference, so a transport outliving its endpoint delivers into a
    /// no-op.
    ///
    /// In-flight pending requests are neither transferred nor cancelled: a
    /// response that only ever arrives via the old transport will not
    /// resolve anything, and the request runs into its timeout. This is a
    /// documented caveat of rebinding, not a continuity guarantee.
    pub fn set_transport(&self, transport: Option<TransportPtr>) {
        // ---
        let mut state = lock_ignore_poison(&self.inner.transport);

        if let Some(old) = state.transport.take() {
            if state.receiving {
                old.unregister_handler();
            }
        }
        state.receiving = false;

        if let Some(new) = transport {
            let weak = Arc::downgrade(&self.inner);
            let router: EnvelopeHandler =
                Arc::new(move |env: Envelope| -> BoxFuture<'static, Result<()>> {
                    let weak = weak.clone();
                    Box::pin(async move {
                        match weak.upgrade() {
                            Some(inner) => RpcEndpoint { inner }.handle_envelope(env).await,
                            None => Ok(()),
                        }
                    })
                });

            state.receiving = new.register_handler(router);
            debug!(receiving = state.receiving, "transport bound");
            state.transport = Some(new);
        }
    }

    /// Set the request handler configuration.
    ///
    /// Replaces any prior configuration atomically; requests dispatched
    /// before the switch finish against the handler they resolved.
    pub fn set_request_handler(&self, handler: RequestHandler) {
        // ---
        *lock_ignore_poison(&self.inner.handler) = Some(Arc::new(handler));
    }

    /// Remove the request handler configuration.
    ///
    /// Subsequent incoming requests fail with a configuration error on the
    /// serving side.
    pub fn clear_request_handler(&self) {
        // ---
        lock_ignore_poison(&self.inner.handler).take();
    }

    /// Issue a request and await the correlated response, typed.
    ///
    /// Convenience over [`request_value`](Self::request_value): serializes
    /// `params` (a value serializing to JSON null is sent as absent params)
    /// and deserializes the response payload.
    ///
    /// # Errors
    ///
    /// Everything [`request_value`](Self::request_value) returns, plus
    /// [`Error::Serialization`] when params or the response payload do not
    /// convert.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let params = none_if_null(serde_json::to_value(params)?);
        let payload = self.request_value(method, params).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Issue a request and await the correlated response.
    ///
    /// Allocates the next request id, registers the pending entry, and
    /// sends the request envelope. The returned future suspends only this
    /// caller; other requests and incoming envelopes proceed independently.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when no transport is set.
    /// - Whatever the transport `send` returns; a failed send leaves the
    ///   registry unchanged.
    /// - [`Error::Timeout`] when no response arrives within the configured
    ///   `max_request_time`. The pending entry stays behind until a late
    ///   response arrives, which is then a silent no-op: the first decision
    ///   wins, the awaitable settles exactly once.
    /// - [`Error::Application`] when the remote handler reported failure;
    ///   carries the remote-supplied message.
    pub async fn request_value(&self, method: &str, params: Option<Value>) -> Result<Value> {
        // ---
        let transport = self.send_capability("issue a request")?;

        let (id, rx) = {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.register()
        };

        let env = Envelope::request(id, method, params);
        if let Err(err) = transport.send(env).await {
            // Atomicity: the caller observes the send failure and the
            // registry remains unchanged.
            lock_ignore_poison(&self.inner.pending).discard(id);
            return Err(err);
        }

        let settled = match self.inner.config.max_request_time {
            Some(limit) => match time::timeout(limit, rx).await {
                Ok(settled) => settled,
                Err(_elapsed) => {
                    debug!(%id, "request timed out");
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        settled.map_err(|_| {
            Error::Transport("response channel closed before a response arrived".into())
        })?
    }

    /// Publish a fire-and-forget message, typed.
    ///
    /// A payload serializing to JSON null is sent as an absent payload.
    pub async fn send<P: Serialize>(&self, topic: &str, payload: P) -> Result<()> {
        // ---
        let payload = none_if_null(serde_json::to_value(payload)?);
        self.send_value(topic, payload).await
    }

    /// Publish a fire-and-forget message.
    ///
    /// No acknowledgement or delivery confirmation is modeled.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when no transport is set; otherwise whatever
    /// the transport `send` returns.
    pub async fn send_value(&self, topic: &str, payload: Option<Value>) -> Result<()> {
        // ---
        let transport = self.send_capability("publish a message")?;
        transport.send(Envelope::message(topic, payload)).await
    }

    /// Subscribe a listener to a topic, or to every topic with
    /// [`WILDCARD_TOPIC`] (`"*"`).
    ///
    /// Keep the `Arc` you pass in: [`off_message`](Self::off_message)
    /// matches by `Arc` identity.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless the current transport accepted a
    /// receive handler — without one, no message could ever be delivered.
    pub fn on_message(&self, topic: &str, listener: MessageListener) -> Result<()> {
        // ---
        self.receive_capability("subscribe to messages")?;
        lock_ignore_poison(&self.inner.hub).subscribe(topic, listener);
        Ok(())
    }

    /// Remove one subscription registered with the same topic/listener pair.
    ///
    /// Returns whether a registration was removed. Removing the last
    /// listener for a topic prunes the topic entry entirely.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] unless the current transport accepted a
    /// receive handler.
    pub fn off_message(&self, topic: &str, listener: &MessageListener) -> Result<bool> {
        // ---
        self.receive_capability("unsubscribe from messages")?;
        Ok(lock_ignore_poison(&self.inner.hub).unsubscribe(topic, listener))
    }

    /// Number of requests currently awaiting a response.
    ///
    /// Timed-out requests still count until their late response arrives.
    pub fn pending_requests(&self) -> usize {
        // ---
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Route one incoming envelope.
    ///
    /// This is the single entry point fed by the transport; custom
    /// transports call it (directly or through the handler registered by
    /// [`set_transport`](Self::set_transport)) for each received envelope.
    /// Pure dispatch: requests go to the configured handler and are answered
    /// with exactly one response, responses settle the matching pending
    /// request, messages fan out to subscribers.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] when a request arrives but the transport
    ///   send capability or the request handler is missing (the error names
    ///   both requirements).
    /// - Transport errors from sending a response.
    ///
    /// An error is fatal only to the envelope being processed; pending
    /// requests and subscriptions are untouched.
    pub async fn handle_envelope(&self, env: Envelope) -> Result<()> {
        // ---
        match env {
            Envelope::Request { id, method, params } => {
                self.serve_request(id, &method, params).await
            }
            Envelope::Response {
                id,
                success,
                payload,
                error,
            } => {
                self.resolve_response(id, success, payload, error);
                Ok(())
            }
            Envelope::Message { topic, payload } => {
                self.deliver_message(&topic, payload);
                Ok(())
            }
        }
    }

    /// Decode a JSON value and route the resulting envelope.
    ///
    /// Convenience for transports carrying envelopes as JSON; malformed
    /// input surfaces as [`Error::Protocol`] (see [`Envelope::decode`]).
    pub async fn handle_value(&self, value: Value) -> Result<()> {
        // ---
        self.handle_envelope(Envelope::decode(value)?).await
    }

    // --- inbound paths ---

    /// Serve one incoming request with exactly one response on every path:
    /// handler success, handler-reported failure, and missing handler all
    /// answer the caller. Only a missing capability or a failed response
    /// send escape as local errors.
    async fn serve_request(&self, id: RequestId, method: &str, params: Option<Value>) -> Result<()> {
        // ---
        let transport = {
            let state = lock_ignore_poison(&self.inner.transport);
            state.transport.clone()
        };
        let handler = lock_ignore_poison(&self.inner.handler).clone();

        let (transport, handler) = match (transport, handler) {
            (Some(transport), Some(handler)) => (transport, handler),
            _ => {
                return Err(Error::Configuration {
                    missing: "a transport `send` capability and a request handler",
                    action: "serve an incoming request",
                })
            }
        };

        let fut = match handler.resolve(method, params) {
            Ok(fut) => fut,
            Err(err) => {
                // No method entry and no fallback: report to the caller,
                // never fail locally.
                warn!(%id, method, "no handler for request");
                return transport.send(Envelope::failure(id, err.to_string())).await;
            }
        };

        let response = match fut.await {
            Ok(payload) => Envelope::success(id, none_if_null(payload)),
            Err(err) => Envelope::failure(id, err.to_string()),
        };
        transport.send(response).await
    }

    /// Settle the pending request matching a response id.
    ///
    /// A response with an unknown id (already timed out and reaped, or a
    /// duplicate) is dropped silently.
    fn resolve_response(
        &self,
        id: RequestId,
        success: bool,
        payload: Option<Value>,
        error: Option<String>,
    ) {
        // ---
        let outcome = if success {
            Ok(payload.unwrap_or(Value::Null))
        } else {
            Err(Error::Application(
                error.unwrap_or_else(|| "remote handler failed".to_owned()),
            ))
        };

        let settled = {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.complete(id, outcome)
        };
        if !settled {
            debug!(%id, "dropping response with no pending request");
        }
    }

    /// Fan one message out to subscribers: wildcard listeners first, then
    /// exact-topic listeners, each in registration order. Unknown topics
    /// with no listeners are dropped silently.
    ///
    /// Listener panics are not caught: a panicking listener aborts the
    /// remaining deliveries for this message and the panic propagates to
    /// whatever invoked the router (fail-fast).
    fn deliver_message(&self, topic: &str, payload: Option<Value>) {
        // ---
        let listeners = {
            let hub = lock_ignore_poison(&self.inner.hub);
            hub.delivery_order(topic)
        };
        if listeners.is_empty() {
            debug!(topic, "dropping message with no subscribers");
            return;
        }

        let payload = payload.unwrap_or(Value::Null);
        for listener in listeners {
            listener(topic, &payload);
        }
    }

    // --- capability checks ---

    fn send_capability(&self, action: &'static str) -> Result<TransportPtr> {
        // ---
        lock_ignore_poison(&self.inner.transport)
            .transport
            .clone()
            .ok_or(Error::Configuration {
                missing: "a transport `send` capability",
                action,
            })
    }

    fn receive_capability(&self, action: &'static str) -> Result<()> {
        // ---
        let state = lock_ignore_poison(&self.inner.transport);
        if state.transport.is_some() && state.receiving {
            Ok(())
        } else {
            Err(Error::Configuration {
                missing: "a transport `register_handler` capability",
                action,
            })
        }
    }
}
