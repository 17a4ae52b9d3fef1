//! Request handler configuration and resolution.
//!
//! An endpoint serves incoming requests through exactly one
//! [`RequestHandler`], chosen at configuration time: either a single
//! function receiving every `(method, params)` pair, or a per-method map
//! with an optional fallback. The variant is fixed when the handler is set;
//! there is no runtime shape-sniffing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::transport::BoxFuture;
use crate::{Error, Result};

/// Type-erased handler receiving the method name alongside the params.
///
/// Used for single-function configurations and for map fallbacks.
pub type DirectFn =
    Arc<dyn Fn(String, Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Type-erased handler for one specific method; receives params alone.
pub type MethodFn = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Handler configuration for the serving side of an endpoint.
///
/// Build the `Routed` variant through [`MethodMap`]; build `Direct` through
/// [`RequestHandler::direct`].
pub enum RequestHandler {
    // ---
    /// One function called with `(method, params)` for every request.
    Direct(DirectFn),

    /// Per-method handlers with an optional catch-all fallback.
    Routed {
        /// Exact-match method handlers, called with params alone.
        methods: HashMap<String, MethodFn>,
        /// Called with `(method, params)` when no method entry matches.
        fallback: Option<DirectFn>,
    },
}

impl RequestHandler {
    // ---
    /// Wrap an async function into a single-function handler configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use peer_rpc::RequestHandler;
    /// use serde_json::{json, Value};
    ///
    /// let handler = RequestHandler::direct(|method: String, _params: Option<Value>| async move {
    ///     Ok(json!({ "echoed": method }))
    /// });
    /// ```
    pub fn direct<F, Fut>(handler: F) -> Self
    where
        F: Fn(String, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        // ---
        Self::Direct(Arc::new(move |method, params| {
            let fut = handler(method, params);
            Box::pin(fut) as Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        }))
    }

    /// Resolve an incoming request to the handler future that serves it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHandler`] when a routed configuration has neither
    /// a matching method entry nor a fallback. The dispatcher converts that
    /// error into a failure response; it is never surfaced locally.
    pub(crate) fn resolve(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<BoxFuture<'static, Result<Value>>> {
        // ---
        match self {
            Self::Direct(handler) => Ok(handler(method.to_owned(), params)),
            Self::Routed { methods, fallback } => {
                if let Some(handler) = methods.get(method) {
                    Ok(handler(params))
                } else if let Some(fallback) = fallback {
                    Ok(fallback(method.to_owned(), params))
                } else {
                    Err(Error::NoHandler(method.to_owned()))
                }
            }
        }
    }
}

impl From<MethodMap> for RequestHandler {
    fn from(map: MethodMap) -> Self {
        // ---
        Self::Routed {
            methods: map.methods,
            fallback: map.fallback,
        }
    }
}

/// Builder for the map-style handler configuration.
///
/// # Example
///
/// ```
/// use peer_rpc::{MethodMap, RequestHandler};
/// use serde_json::{json, Value};
///
/// let handler: RequestHandler = MethodMap::new()
///     .handle("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
///     .fallback(|method: String, _params: Option<Value>| async move {
///         Ok(json!(format!("unrouted: {method}")))
///     })
///     .into();
/// ```
#[derive(Default)]
pub struct MethodMap {
    // ---
    methods: HashMap<String, MethodFn>,
    fallback: Option<DirectFn>,
}

impl MethodMap {
    // ---
    /// Create an empty method map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for one method.
    ///
    /// Params are deserialized into `Req` (absent params deserialize from
    /// JSON null), the return value is serialized back into the response
    /// payload. A params shape the handler cannot accept fails the request
    /// with a failure response, the same as a handler error.
    pub fn handle<F, Fut, Req, Resp>(self, method: &str, handler: F) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
    {
        // ---
        self.handle_value(method, move |params: Option<Value>| {
            let req: Result<Req> =
                serde_json::from_value(params.unwrap_or(Value::Null)).map_err(Error::from);
            let fut = req.map(&handler);

            async move {
                let resp = fut?.await?;
                Ok(serde_json::to_value(resp)?)
            }
        })
    }

    /// Register an untyped handler working directly on optional JSON params.
    pub fn handle_value<F, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        // ---
        let wrapped: MethodFn = Arc::new(move |params| {
            let fut = handler(params);
            Box::pin(fut) as Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        });
        self.methods.insert(method.to_owned(), wrapped);
        self
    }

    /// Register the fallback invoked for methods with no specific entry.
    pub fn fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        // ---
        self.fallback = Some(Arc::new(move |method, params| {
            let fut = handler(method, params);
            Box::pin(fut) as Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        }));
        self
    }
}
