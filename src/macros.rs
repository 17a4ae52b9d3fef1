// src/macros.rs

//! Named call-surface generation.
//!
//! Rust has no dynamic property interception, so the property-style call
//! sugar (`request.method_name(...)` alongside `request("method_name", ...)`)
//! is provided as a declarative macro: [`rpc_surface!`] generates a struct
//! whose named methods forward to [`RpcEndpoint::request`] and
//! [`RpcEndpoint::send`] with the method/topic name filled in. The explicit
//! forms remain the underlying contract; the generated surface adds nothing
//! beyond names.
//!
//! [`RpcEndpoint::request`]: crate::RpcEndpoint::request
//! [`RpcEndpoint::send`]: crate::RpcEndpoint::send

/// Generate a named call surface over an [`RpcEndpoint`](crate::RpcEndpoint).
///
/// Each identifier in `requests { .. }` becomes an async method issuing a
/// request under that name; each identifier in `messages { .. }` becomes an
/// async method publishing a message under that topic.
///
/// # Example
///
/// ```
/// use peer_rpc::{memory_pair, MethodMap, RpcConfig, RpcEndpoint};
///
/// peer_rpc::rpc_surface! {
///     pub struct SensorApi {
///         requests { read_temperature }
///         messages { heartbeat }
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> peer_rpc::Result<()> {
/// let (left, right) = memory_pair();
///
/// let server = RpcEndpoint::new(RpcConfig::default());
/// server.set_transport(Some(right));
/// server.set_request_handler(
///     MethodMap::new()
///         .handle("read_temperature", |unit: String| async move {
///             Ok(format!("21.5 {unit}"))
///         })
///         .into(),
/// );
///
/// let client = RpcEndpoint::new(RpcConfig::default());
/// client.set_transport(Some(left));
///
/// let api = SensorApi::new(client);
/// let reading: String = api.read_temperature("celsius").await?;
/// assert_eq!(reading, "21.5 celsius");
/// api.heartbeat(42).await?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! rpc_surface {
    (
        $vis:vis struct $name:ident {
            $(requests { $($request:ident),* $(,)? })?
            $(messages { $($message:ident),* $(,)? })?
        }
    ) => {
        $vis struct $name {
            endpoint: $crate::RpcEndpoint,
        }

        impl $name {
            $vis fn new(endpoint: $crate::RpcEndpoint) -> Self {
                Self { endpoint }
            }

            /// Borrow the wrapped endpoint.
            $vis fn endpoint(&self) -> &$crate::RpcEndpoint {
                &self.endpoint
            }

            $($(
                $vis async fn $request<P, R>(&self, params: P) -> $crate::Result<R>
                where
                    P: ::serde::Serialize,
                    R: ::serde::de::DeserializeOwned,
                {
                    self.endpoint.request(stringify!($request), params).await
                }
            )*)?

            $($(
                $vis async fn $message<P: ::serde::Serialize>(
                    &self,
                    payload: P,
                ) -> $crate::Result<()> {
                    self.endpoint.send(stringify!($message), payload).await
                }
            )*)?
        }
    };
}
