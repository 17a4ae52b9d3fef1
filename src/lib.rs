//! Transport-agnostic RPC correlation over any caller-supplied channel
//!
//! This library lets two endpoints exchange three kinds of envelopes —
//! requests expecting a response, responses correlated to a prior request,
//! and fire-and-forget messages — without prescribing a transport, a wire
//! byte format, or a serialization scheme. It handles request id
//! allocation, request/response matching, timeout handling, request
//! dispatch to configured handlers, and message fan-out to subscribers.
//!
//! The transport is an injected capability implementing [`Transport`]; an
//! in-memory reference pair is provided via [`memory_pair`] for tests and
//! local execution.

// Import all sub modules once...
mod config;
mod endpoint;
mod error;
mod protocol;
mod transport;

mod macros;

// Re-export main types
pub use endpoint::RpcEndpoint;

pub use config::{RpcConfig, DEFAULT_MAX_REQUEST_ID, DEFAULT_MAX_REQUEST_TIME};

pub use error::{Error, Result};

pub use transport::memory_pair;

// --- public re-exports
pub use endpoint::{
    //
    DirectFn,
    MessageListener,
    MethodFn,
    MethodMap,
    RequestHandler,
    WILDCARD_TOPIC,
};

pub use protocol::{
    //
    Envelope,
    RequestId,
};

pub use transport::{
    //
    BoxFuture,
    EnvelopeHandler,
    Transport,
    TransportPtr,
};
