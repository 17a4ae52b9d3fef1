// src/protocol/envelope.rs

//! Envelope shapes exchanged between endpoints.
//!
//! An [`Envelope`] is one logical unit exchanged over the transport: a
//! request expecting a response, a response correlated to a prior request,
//! or a fire-and-forget message. The envelope model is pure data contract;
//! all behavior lives in the endpoint layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Correlation identifier for one outstanding request.
///
/// Ids are positive integers, unique among currently-outstanding requests on
/// one endpoint, monotonically assigned and wrapping back to 1 after the
/// configured ceiling. They are carried *in-band* inside envelopes and are
/// opaque to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Borrow the raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logical unit exchanged over the transport.
///
/// Serializes as a tagged object whose `type` field is one of `request`,
/// `response`, or `message`. Anything else is a protocol error at the
/// [`Envelope::decode`] boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    // ---
    /// A request expecting exactly one response correlated by `id`.
    Request {
        /// Correlation id, allocated by the issuing endpoint.
        id: RequestId,
        /// Method name for handler dispatch on the serving side.
        method: String,
        /// Optional request parameters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },

    /// The response to a prior request with the same `id`.
    ///
    /// `error` is present iff `success` is false; `payload` is meaningful
    /// iff `success` is true. The constructors enforce this.
    Response {
        /// Correlation id copied from the request.
        id: RequestId,
        /// Whether the remote handler completed successfully.
        success: bool,
        /// Handler return value on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Failure message on error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A fire-and-forget message, fanned out to topic subscribers.
    Message {
        /// Topic name used for subscription matching.
        #[serde(rename = "id")]
        topic: String,
        /// Optional message payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl Envelope {
    // ---
    /// Create a request envelope.
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        // ---
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a success response envelope.
    pub fn success(id: RequestId, payload: Option<Value>) -> Self {
        // ---
        Self::Response {
            id,
            success: true,
            payload,
            error: None,
        }
    }

    /// Create a failure response envelope.
    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        // ---
        Self::Response {
            id,
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Create a message envelope.
    pub fn message(topic: impl Into<String>, payload: Option<Value>) -> Self {
        // ---
        Self::Message {
            topic: topic.into(),
            payload,
        }
    }

    /// Decode an envelope from a JSON value.
    ///
    /// This is the classification boundary for incoming traffic: transports
    /// that carry envelopes as JSON should decode through this function so
    /// that malformed input surfaces as [`Error::Protocol`] rather than a
    /// bare serde failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] when the value has no string `type`
    /// discriminant, when `type` is none of `request`/`response`/`message`
    /// (the offending value is named in the message), or when the declared
    /// shape is otherwise malformed.
    pub fn decode(value: Value) -> Result<Self> {
        // ---
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "envelope `type` must be a string, got: {other}"
                )))
            }
            None => {
                return Err(Error::Protocol(
                    "envelope is missing a `type` discriminant".into(),
                ))
            }
        };

        match kind.as_str() {
            "request" | "response" | "message" => serde_json::from_value(value)
                .map_err(|err| Error::Protocol(format!("malformed `{kind}` envelope: {err}"))),
            other => Err(Error::Protocol(format!(
                "unexpected envelope type: `{other}`"
            ))),
        }
    }
}

/// Collapse `Value::Null` to `None` so absent and null payloads are one case.
pub(crate) fn none_if_null(value: Value) -> Option<Value> {
    // ---
    match value {
        Value::Null => None,
        value => Some(value),
    }
}
