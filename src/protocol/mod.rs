//! Protocol layer public interface.
//!
//! Defines the three wire-level envelope shapes and the request id type.
//! Envelopes are logical objects; serialization to bytes is the transport's
//! concern.

mod envelope;

// --- Protocol re-exports ---

pub use envelope::{Envelope, RequestId};

pub(crate) use envelope::none_if_null;
