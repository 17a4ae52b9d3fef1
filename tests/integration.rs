//! End-to-end tests over the in-memory transport pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use peer_rpc::{
    //
    memory_pair,
    BoxFuture,
    Envelope,
    EnvelopeHandler,
    Error,
    MessageListener,
    MethodMap,
    RequestHandler,
    Result,
    RpcConfig,
    RpcEndpoint,
    Transport,
    TransportPtr,
};

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i32,
    b: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddResponse {
    sum: i32,
}

/// Endpoint serving a small math API.
fn math_server(transport: TransportPtr) -> RpcEndpoint {
    // ---
    let server = RpcEndpoint::new(RpcConfig::default());
    server.set_transport(Some(transport));
    server.set_request_handler(
        MethodMap::new()
            .handle("add", |req: AddRequest| async move {
                Ok(AddResponse { sum: req.a + req.b })
            })
            .handle_value("fail", |_params| async {
                Err(Error::Application("E".into()))
            })
            .into(),
    );
    server
}

fn client_endpoint(transport: TransportPtr, config: RpcConfig) -> RpcEndpoint {
    // ---
    let client = RpcEndpoint::new(config);
    client.set_transport(Some(transport));
    client
}

/// Raw serving side: captures every incoming envelope into a channel
/// without responding. Stands in for a slow or detached peer.
fn capture_handler(tx: mpsc::UnboundedSender<Envelope>) -> EnvelopeHandler {
    // ---
    Arc::new(move |env: Envelope| -> BoxFuture<'static, Result<()>> {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(env);
            Ok(())
        })
    })
}

#[tokio::test]
async fn test_basic_request() -> Result<()> {
    // ---
    let (left, right) = memory_pair();
    let _server = math_server(right);
    let client = client_endpoint(left, RpcConfig::default());

    let resp: AddResponse = client.request("add", AddRequest { a: 2, b: 3 }).await?;
    assert_eq!(resp.sum, 5);
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_application_error_carries_remote_message() {
    // ---
    let (left, right) = memory_pair();
    let _server = math_server(right);
    let client = client_endpoint(left, RpcConfig::default());

    let err = client.request_value("fail", None).await.unwrap_err();
    match err {
        Error::Application(msg) => assert_eq!(msg, "E"),
        other => panic!("expected application error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unrouted_method_without_fallback_cites_no_handler() {
    // ---
    let (left, right) = memory_pair();
    let _server = math_server(right);
    let client = client_endpoint(left, RpcConfig::default());

    let err = client.request_value("mul", None).await.unwrap_err();
    match err {
        Error::Application(msg) => assert!(msg.contains("no handler found for method: mul")),
        other => panic!("expected application error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fallback_receives_method_and_params() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let server = RpcEndpoint::new(RpcConfig::default());
    server.set_transport(Some(right));
    server.set_request_handler(
        MethodMap::new()
            .fallback(|method, params| async move {
                Ok(json!([method, params.unwrap_or(Value::Null)]))
            })
            .into(),
    );

    let client = client_endpoint(left, RpcConfig::default());
    let out = client.request_value("anything", Some(json!(7))).await?;
    assert_eq!(out, json!(["anything", 7]));
    Ok(())
}

#[tokio::test]
async fn test_direct_handler_sees_every_method() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let server = RpcEndpoint::new(RpcConfig::default());
    server.set_transport(Some(right));
    server.set_request_handler(RequestHandler::direct(|method, params| async move {
        Ok(json!({ "method": method, "params": params }))
    }));

    let client = client_endpoint(left, RpcConfig::default());
    let out = client.request_value("echo", Some(json!(true))).await?;
    assert_eq!(out, json!({"method": "echo", "params": true}));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests() {
    // ---
    let (left, right) = memory_pair();
    let _server = math_server(right);
    let client = client_endpoint(left, RpcConfig::default());

    let mut handles = Vec::new();

    for i in 0..10 {
        // ---
        let c = client.clone();

        handles.push(tokio::spawn(async move {
            let resp: AddResponse = c.request("add", AddRequest { a: i, b: i }).await.unwrap();
            resp.sum
        }));
    }

    for (i, task) in handles.into_iter().enumerate() {
        let sum = task.await.unwrap();
        assert_eq!(sum, (i as i32) * 2);
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_timeout_then_late_response_is_noop() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let (tx, mut rx) = mpsc::unbounded_channel();
    right.register_handler(capture_handler(tx));

    let client = client_endpoint(
        left,
        RpcConfig::new().with_max_request_time(Duration::from_millis(50)),
    );

    let err = client.request_value("slow", None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // The entry stays behind until a late response arrives.
    assert_eq!(client.pending_requests(), 1);

    let id = match rx.recv().await.unwrap() {
        Envelope::Request { id, .. } => id,
        other => panic!("expected request, got {other:?}"),
    };

    // Late response: first decision won, this settles nothing, but it does
    // reap the abandoned entry.
    right.send(Envelope::success(id, Some(json!("late")))).await?;
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_response_is_noop() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let responder = right.clone();
    let double_reply: EnvelopeHandler =
        Arc::new(move |env: Envelope| -> BoxFuture<'static, Result<()>> {
            let responder = responder.clone();
            Box::pin(async move {
                if let Envelope::Request { id, .. } = env {
                    responder
                        .send(Envelope::success(id, Some(json!("first"))))
                        .await?;
                    responder
                        .send(Envelope::success(id, Some(json!("second"))))
                        .await?;
                }
                Ok(())
            })
        });
    right.register_handler(double_reply);

    let client = client_endpoint(left, RpcConfig::default());
    let out = client.request_value("anything", None).await?;

    assert_eq!(out, json!("first"));
    assert_eq!(client.pending_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_responses_resolve_by_id() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    // Hold the first request; once the second arrives, answer both in
    // reverse order, each payload carrying its own id.
    let held: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
    let responder = right.clone();
    let reversing: EnvelopeHandler =
        Arc::new(move |env: Envelope| -> BoxFuture<'static, Result<()>> {
            let responder = responder.clone();
            let held = held.clone();
            Box::pin(async move {
                let pending = {
                    let mut held = held.lock().unwrap();
                    held.push(env);
                    if held.len() == 2 {
                        std::mem::take(&mut *held)
                    } else {
                        Vec::new()
                    }
                };
                for request in pending.into_iter().rev() {
                    if let Envelope::Request { id, .. } = request {
                        responder
                            .send(Envelope::success(id, Some(json!(id.get()))))
                            .await?;
                    }
                }
                Ok(())
            })
        });
    right.register_handler(reversing);

    let client = client_endpoint(left, RpcConfig::default());

    let (first, second) = tokio::join!(
        client.request_value("a", None),
        client.request_value("b", None)
    );

    // Ids are allocated in issue order; each caller got its own response
    // even though they arrived reversed.
    assert_eq!(first?, json!(1));
    assert_eq!(second?, json!(2));
    Ok(())
}

#[tokio::test]
async fn test_id_sequence_wraps_past_ceiling() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let responder = right.clone();
    let echo_id: EnvelopeHandler =
        Arc::new(move |env: Envelope| -> BoxFuture<'static, Result<()>> {
            let responder = responder.clone();
            Box::pin(async move {
                if let Envelope::Request { id, .. } = env {
                    responder
                        .send(Envelope::success(id, Some(json!(id.get()))))
                        .await?;
                }
                Ok(())
            })
        });
    right.register_handler(echo_id);

    let client = client_endpoint(left, RpcConfig::new().with_max_request_id(3));

    let mut observed = Vec::new();
    for _ in 0..4 {
        observed.push(client.request_value("seq", None).await?);
    }
    assert_eq!(observed, vec![json!(1), json!(2), json!(3), json!(1)]);
    Ok(())
}

#[tokio::test]
async fn test_messages_fan_out_to_topic_and_wildcard() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let publisher = client_endpoint(left, RpcConfig::default());
    let subscriber = client_endpoint(right, RpcConfig::default());

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let ping_log = log.clone();
    let ping: MessageListener = Arc::new(move |topic, payload| {
        ping_log.lock().unwrap().push(format!("ping:{topic}:{payload}"));
    });
    let pong_log = log.clone();
    let pong: MessageListener = Arc::new(move |topic, _| {
        pong_log.lock().unwrap().push(format!("pong:{topic}"));
    });
    let any_log = log.clone();
    let any: MessageListener = Arc::new(move |topic, _| {
        any_log.lock().unwrap().push(format!("any:{topic}"));
    });

    subscriber.on_message("ping", ping)?;
    subscriber.on_message("pong", pong)?;
    subscriber.on_message("*", any)?;

    publisher.send("ping", 7).await?;

    // Wildcard first, then the exact topic; "pong" listeners untouched.
    assert_eq!(*log.lock().unwrap(), vec!["any:ping", "ping:ping:7"]);
    Ok(())
}

#[tokio::test]
async fn test_unsubscribing_last_listener_prunes_topic() -> Result<()> {
    // ---
    let (left, right) = memory_pair();

    let publisher = client_endpoint(left, RpcConfig::default());
    let subscriber = client_endpoint(right, RpcConfig::default());

    let delivered = Arc::new(AtomicBool::new(false));
    let flag = delivered.clone();
    let listener: MessageListener = Arc::new(move |_, _| {
        flag.store(true, Ordering::SeqCst);
    });

    subscriber.on_message("ping", listener.clone())?;
    assert!(subscriber.off_message("ping", &listener)?);
    assert!(!subscriber.off_message("ping", &listener)?);

    // Publishing to the pruned topic delivers nothing and is not an error.
    publisher.send_value("ping", None).await?;
    assert!(!delivered.load(Ordering::SeqCst));
    Ok(())
}

#[tokio::test]
async fn test_listener_panic_aborts_remaining_deliveries() {
    // ---
    let (left, right) = memory_pair();

    let publisher = client_endpoint(left, RpcConfig::default());
    let subscriber = client_endpoint(right, RpcConfig::default());

    let second_called = Arc::new(AtomicBool::new(false));

    let panicking: MessageListener = Arc::new(|_, _| panic!("listener failure"));
    let flag = second_called.clone();
    let second: MessageListener = Arc::new(move |_, _| {
        flag.store(true, Ordering::SeqCst);
    });

    subscriber.on_message("ping", panicking).unwrap();
    subscriber.on_message("ping", second).unwrap();

    // Fail-fast: the panic propagates to the publishing task and the second
    // listener never runs for this delivery.
    let publish = tokio::spawn(async move { publisher.send_value("ping", None).await });
    let joined = publish.await;

    assert!(joined.unwrap_err().is_panic());
    assert!(!second_called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_request_without_transport_is_a_configuration_error() {
    // ---
    let endpoint = RpcEndpoint::new(RpcConfig::default());

    let err = endpoint.request_value("add", None).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("issue a request"));
    assert_eq!(endpoint.pending_requests(), 0);

    let err = endpoint.send_value("ping", None).await.unwrap_err();
    assert!(err.to_string().contains("publish a message"));
}

/// Send-only transport: keeps the default `register_handler`, which declines.
struct SendOnly;

#[async_trait::async_trait]
impl Transport for SendOnly {
    async fn send(&self, _env: Envelope) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_subscriptions_require_a_receiving_transport() {
    // ---
    let endpoint = RpcEndpoint::new(RpcConfig::default());
    endpoint.set_transport(Some(Arc::new(SendOnly)));

    let listener: MessageListener = Arc::new(|_, _| {});
    let err = endpoint.on_message("ping", listener.clone()).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("register_handler"));

    let err = endpoint.off_message("ping", &listener).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

/// Transport whose send always fails; used to check registration atomicity.
struct FailingSend;

#[async_trait::async_trait]
impl Transport for FailingSend {
    async fn send(&self, _env: Envelope) -> Result<()> {
        Err(Error::Transport("wire down".into()))
    }
}

#[tokio::test]
async fn test_failed_send_leaves_registry_unchanged() {
    // ---
    let endpoint = RpcEndpoint::new(RpcConfig::default());
    endpoint.set_transport(Some(Arc::new(FailingSend)));

    let err = endpoint.request_value("add", None).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(endpoint.pending_requests(), 0);
}

#[tokio::test]
async fn test_serving_without_handler_is_a_configuration_error() {
    // ---
    let (left, right) = memory_pair();

    let server = RpcEndpoint::new(RpcConfig::default());
    server.set_transport(Some(right));
    // No request handler configured.

    let err = left
        .send(Envelope::request(1u64.into(), "add", None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("request handler"));
}

#[tokio::test]
async fn test_transport_swap_abandons_inflight_requests() {
    // ---
    let (left_old, right_old) = memory_pair();
    let (left_new, _right_new) = memory_pair();

    let (tx, mut rx) = mpsc::unbounded_channel();
    right_old.register_handler(capture_handler(tx));

    let client = client_endpoint(
        left_old,
        RpcConfig::new().with_max_request_time(Duration::from_millis(100)),
    );

    let requester = client.clone();
    let inflight = tokio::spawn(async move { requester.request_value("slow", None).await });

    // Wait until the request is on the wire, then rebind away from it.
    let id = match rx.recv().await.unwrap() {
        Envelope::Request { id, .. } => id,
        other => panic!("expected request, got {other:?}"),
    };
    client.set_transport(Some(left_new));

    // The response only ever travels the old transport; the router is no
    // longer attached there, so it cannot resolve anything.
    right_old
        .send(Envelope::success(id, Some(json!("ghost"))))
        .await
        .unwrap();

    let err = inflight.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // Not transferred, not cancelled: the entry is still outstanding.
    assert_eq!(client.pending_requests(), 1);
}

#[tokio::test]
async fn test_request_with_timeout_disabled() -> Result<()> {
    // ---
    let (left, right) = memory_pair();
    let _server = math_server(right);
    let client = client_endpoint(left, RpcConfig::new().without_request_timeout());

    let resp: AddResponse = client.request("add", AddRequest { a: 20, b: 22 }).await?;
    assert_eq!(resp.sum, 42);
    Ok(())
}

#[tokio::test]
async fn test_protocol_errors_for_malformed_values() {
    // ---
    let endpoint = RpcEndpoint::new(RpcConfig::default());

    let err = endpoint.handle_value(json!({"id": 1})).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    let err = endpoint
        .handle_value(json!({"type": "telemetry"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("telemetry"));

    // A protocol error is fatal only to that envelope; the endpoint state
    // is untouched.
    assert_eq!(endpoint.pending_requests(), 0);
}
