//! Integration tests for the CDP transport and session multiplexer.
//!
//! Each test spins up a mock WebSocket browser with configurable behavior,
//! connects a `CdpClient` to it, and verifies the expected interactions.

#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use hubcap::cdp::{CdpClient, CdpConfig, CdpError};

fn test_config() -> CdpConfig {
    CdpConfig {
        connect_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(5),
        channel_capacity: 256,
    }
}

async fn connect(addr: SocketAddr) -> CdpClient {
    CdpClient::connect_ws_url(&format!("ws://{addr}"), test_config())
        .await
        .unwrap()
}

// =============================================================================
// Mock browser helpers
// =============================================================================

/// Serve one WebSocket connection, answering each command through
/// `respond`. The responder returns a list of frames to send back, so it
/// can emit events alongside the response.
async fn start_server(respond: fn(&Value) -> Vec<Value>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg {
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        for frame in respond(&cmd) {
                            sink.send(Message::Text(frame.to_string().into()))
                                .await
                                .unwrap();
                        }
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// `{"id": N, "result": {}}` for everything, echoing the sessionId.
fn echo_responder(cmd: &Value) -> Vec<Value> {
    let mut response = json!({"id": cmd["id"], "result": {}});
    if let Some(session) = cmd.get("sessionId") {
        response["sessionId"] = session.clone();
    }
    vec![response]
}

/// Echo responder that also answers `Target.attachToTarget` with a session
/// id derived from the target id.
fn attach_responder(cmd: &Value) -> Vec<Value> {
    if cmd["method"] == "Target.attachToTarget" {
        let target = cmd["params"]["targetId"].as_str().unwrap_or("T");
        return vec![json!({
            "id": cmd["id"],
            "result": {"sessionId": format!("session-for-{target}")}
        })];
    }
    echo_responder(cmd)
}

// =============================================================================
// Request/response basics
// =============================================================================

#[tokio::test]
async fn call_round_trip() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Browser.getVersion" {
            vec![json!({
                "id": cmd["id"],
                "result": {"product": "Chrome/126.0", "protocolVersion": "1.3"}
            })]
        } else {
            echo_responder(cmd)
        }
    })
    .await;

    let client = connect(addr).await;
    let result = client.raw_call("Browser.getVersion", None).await.unwrap();
    assert_eq!(result["product"], "Chrome/126.0");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn protocol_error_is_returned_verbatim() {
    let (addr, server) = start_server(|cmd| {
        vec![json!({
            "id": cmd["id"],
            "error": {"code": -32000, "message": "No node with given id found"}
        })]
    })
    .await;

    let client = connect(addr).await;
    let err = client
        .raw_call("DOM.describeNode", Some(json!({"nodeId": 1})))
        .await
        .unwrap_err();
    let CdpError::Protocol { code, message } = err else {
        panic!("expected protocol error, got {err:?}");
    };
    assert_eq!(code, -32000);
    assert_eq!(message, "No node with given id found");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn concurrent_callers_get_their_own_responses() {
    let (addr, server) = start_server(|cmd| {
        // Answer with the command's own method name so mixups are visible.
        vec![json!({
            "id": cmd["id"],
            "result": {"echo": cmd["method"]}
        })]
    })
    .await;

    let client = std::sync::Arc::new(connect(addr).await);
    let mut handles = Vec::new();
    for i in 0..16 {
        let client = std::sync::Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let method = format!("Test.method{i}");
            let result = client.raw_call(&method, None).await.unwrap();
            assert_eq!(result["echo"], method.as_str());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    server.abort();
}

#[tokio::test]
async fn command_times_out_when_browser_is_silent() {
    // Accept commands, never answer.
    let (addr, server) = start_server(|_cmd| vec![]).await;

    let config = CdpConfig {
        command_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let client = CdpClient::connect_ws_url(&format!("ws://{addr}"), config)
        .await
        .unwrap();

    let err = client.raw_call("Page.enable", None).await.unwrap_err();
    assert!(matches!(err, CdpError::Timeout { .. }), "got {err:?}");

    server.abort();
}

#[tokio::test]
async fn connect_fails_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = CdpClient::connect_ws_url(&format!("ws://{addr}"), test_config())
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::ConnectFailed(_)), "got {err:?}");
}

// =============================================================================
// Connection loss
// =============================================================================

#[tokio::test]
async fn pending_calls_drain_on_connection_loss() {
    // A server that drops the connection as soon as a command arrives.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (_sink, mut source) = ws.split();
                let _ = source.next().await;
                // Dropping both halves closes the socket mid-request.
            });
        }
    });

    let client = connect(addr).await;
    let err = client.raw_call("Page.enable", None).await.unwrap_err();
    assert!(matches!(err, CdpError::TransportLost(_)), "got {err:?}");

    // The connection is permanently unusable: later calls fail immediately.
    let err = client.raw_call("Page.enable", None).await.unwrap_err();
    assert!(matches!(err, CdpError::TransportLost(_)), "got {err:?}");
    assert!(!client.is_connected());

    server.abort();
}

#[tokio::test]
async fn subscriptions_close_on_client_close() {
    let (addr, server) = start_server(echo_responder).await;

    let client = connect(addr).await;
    let mut events = client.subscribe("Target.targetCreated").await.unwrap();
    client.close().await.unwrap();

    // After close has returned, the stream yields nothing further.
    let next = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("stream should close, not hang");
    assert!(next.is_none());

    server.abort();
}

// =============================================================================
// Session multiplexing
// =============================================================================

#[tokio::test]
async fn attach_is_cached_per_target() {
    static ATTACHES: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            ATTACHES.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let first = client.attach("TARGET-A").await.unwrap();
    let second = client.attach("TARGET-A").await.unwrap();
    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(ATTACHES.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(client.attached_session_count(), 1);

    client.attach("TARGET-B").await.unwrap();
    assert_eq!(ATTACHES.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(client.attached_session_count(), 2);

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn detach_event_invalidates_session_cache() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            return vec![json!({
                "id": cmd["id"],
                "result": {"sessionId": "S1"}
            })];
        }
        if cmd["method"] == "Test.detachNow" {
            // Respond, then emit the browser-scoped detach event.
            return vec![
                json!({"id": cmd["id"], "result": {}}),
                json!({
                    "method": "Target.detachedFromTarget",
                    "params": {"sessionId": "S1", "targetId": "T1"}
                }),
            ];
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    client.attach("T1").await.unwrap();
    assert_eq!(client.attached_session_count(), 1);

    client.raw_call("Test.detachNow", None).await.unwrap();

    // The reader loop processes the detach before we can observe it only
    // eventually; poll briefly.
    let mut cleared = false;
    for _ in 0..50 {
        if client.attached_session_count() == 0 {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleared, "detach event should clear the session cache");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn session_commands_carry_session_id() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            return vec![json!({"id": cmd["id"], "result": {"sessionId": "SESS-9"}})];
        }
        // Echo the sessionId back in the result so the test can assert on
        // what the client sent.
        vec![json!({
            "id": cmd["id"],
            "result": {"sawSession": cmd["sessionId"]},
            "sessionId": cmd["sessionId"]
        })]
    })
    .await;

    let client = connect(addr).await;
    let result = client
        .raw_call_session("T1", "Runtime.evaluate", Some(json!({"expression": "1"})))
        .await
        .unwrap();
    assert_eq!(result["sawSession"], "SESS-9");

    client.close().await.unwrap();
    server.abort();
}

// =============================================================================
// Event routing
// =============================================================================

#[tokio::test]
async fn session_events_route_to_session_subscribers_in_order() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            return vec![json!({"id": cmd["id"], "result": {"sessionId": "S1"}})];
        }
        if cmd["method"] == "Test.emit" {
            let mut frames = vec![json!({"id": cmd["id"], "result": {}, "sessionId": "S1"})];
            for i in 0..5 {
                frames.push(json!({
                    "method": "Network.requestWillBeSent",
                    "params": {"requestId": format!("R{i}")},
                    "sessionId": "S1"
                }));
            }
            return frames;
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let session = client.attach("T1").await.unwrap();
    let mut events = session.subscribe("Network.requestWillBeSent").await.unwrap();

    session.raw_call("Test.emit", None).await.unwrap();

    for i in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.params["requestId"], format!("R{i}"));
    }
    assert_eq!(events.dropped(), 0);

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn prefix_subscription_sees_whole_domain() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            return vec![json!({"id": cmd["id"], "result": {"sessionId": "S1"}})];
        }
        if cmd["method"] == "Test.emit" {
            return vec![
                json!({"id": cmd["id"], "result": {}, "sessionId": "S1"}),
                json!({
                    "method": "Network.requestWillBeSent",
                    "params": {"requestId": "R1", "request": {"url": "https://x/1"}},
                    "sessionId": "S1"
                }),
                json!({
                    "method": "Page.loadEventFired",
                    "params": {},
                    "sessionId": "S1"
                }),
                json!({
                    "method": "Network.responseReceived",
                    "params": {"requestId": "R1", "response": {"status": 200}},
                    "sessionId": "S1"
                }),
            ];
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let session = client.attach("T1").await.unwrap();
    let mut events = session.subscribe("Network.*").await.unwrap();

    session.raw_call("Test.emit", None).await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.method, "Network.requestWillBeSent");
    // Page.loadEventFired is filtered; the next Network event follows.
    let second = events.recv().await.unwrap();
    assert_eq!(second.method, "Network.responseReceived");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn events_for_other_sessions_are_not_delivered() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Target.attachToTarget" {
            return vec![json!({"id": cmd["id"], "result": {"sessionId": "MINE"}})];
        }
        if cmd["method"] == "Test.emit" {
            return vec![
                json!({"id": cmd["id"], "result": {}, "sessionId": "MINE"}),
                json!({
                    "method": "Page.loadEventFired",
                    "params": {"who": "other"},
                    "sessionId": "OTHER"
                }),
                json!({
                    "method": "Page.loadEventFired",
                    "params": {"who": "mine"},
                    "sessionId": "MINE"
                }),
            ];
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let session = client.attach("T1").await.unwrap();
    let mut events = session.subscribe("Page.loadEventFired").await.unwrap();

    session.raw_call("Test.emit", None).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.params["who"], "mine");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_teardown() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Test.garbage" {
            return vec![
                // Raw junk the client must survive, then the real response.
                json!("this is not an object"),
                json!({"neither": "response nor event"}),
                json!({"id": cmd["id"], "result": {"ok": true}}),
            ];
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let result = client.raw_call("Test.garbage", None).await.unwrap();
    assert_eq!(result["ok"], true);
    assert!(client.is_connected());

    client.close().await.unwrap();
    server.abort();
}

// =============================================================================
// Page layer against the mock browser
// =============================================================================

#[tokio::test]
async fn page_enables_each_domain_once() {
    static ENABLES: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Page.enable" {
            ENABLES.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    page.ensure_domain("Page").await.unwrap();
    page.ensure_domain("Page").await.unwrap();
    page.ensure_domain("Page").await.unwrap();
    assert_eq!(ENABLES.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(page.domain_enabled("Page"));

    page.disable_domain("Page").await.unwrap();
    assert!(!page.domain_enabled("Page"));

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn eval_maps_remote_objects() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Runtime.evaluate" {
            let expr = cmd["params"]["expression"].as_str().unwrap_or_default();
            let result = if expr.contains("location.href") {
                json!({"type": "string", "value": "https://example.com/"})
            } else {
                json!({"type": "number", "value": 42})
            };
            let mut frame = json!({"id": cmd["id"], "result": {"result": result}});
            if let Some(session) = cmd.get("sessionId") {
                frame["sessionId"] = session.clone();
            }
            return vec![frame];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();

    let value = page.eval("6 * 7").await.unwrap();
    assert_eq!(value.type_name(), "number");

    let url = page.url().await.unwrap();
    assert_eq!(url, "https://example.com/");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn query_not_found_for_zero_matches() {
    let (addr, server) = start_server(|cmd| {
        let mut frame = match cmd["method"].as_str().unwrap_or_default() {
            "DOM.getDocument" => {
                json!({"id": cmd["id"], "result": {"root": {"nodeId": 1}}})
            }
            // nodeId 0 is CDP's "no match".
            "DOM.querySelector" => json!({"id": cmd["id"], "result": {"nodeId": 0}}),
            _ => return attach_responder(cmd),
        };
        if let Some(session) = cmd.get("sessionId") {
            frame["sessionId"] = session.clone();
        }
        vec![frame]
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let err = page.query("#missing").await.unwrap_err();
    assert!(matches!(err, CdpError::NotFound(_)), "got {err:?}");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn navigate_and_wait_completes_on_frame_stop() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Page.navigate" {
            return vec![
                json!({
                    "id": cmd["id"],
                    "result": {"frameId": "MAIN", "loaderId": "L1"},
                    "sessionId": cmd["sessionId"]
                }),
                // A subframe stops first; the wait must hold out for MAIN.
                json!({
                    "method": "Page.frameStoppedLoading",
                    "params": {"frameId": "SUBFRAME"},
                    "sessionId": cmd["sessionId"]
                }),
                json!({
                    "method": "Page.frameStoppedLoading",
                    "params": {"frameId": "MAIN"},
                    "sessionId": cmd["sessionId"]
                }),
            ];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let result = page
        .navigate_and_wait("https://example.com/", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(result.frame_id, "MAIN");

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn wait_for_selector_sees_late_appearance() {
    static CALLS: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Runtime.evaluate" {
            // The selector "appears" on the third poll.
            let n = CALLS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let found = n >= 2;
            return vec![json!({
                "id": cmd["id"],
                "result": {"result": {"type": "boolean", "value": found}},
                "sessionId": cmd["sessionId"]
            })];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    page.wait_for("#late", Duration::from_secs(5)).await.unwrap();
    assert!(CALLS.load(std::sync::atomic::Ordering::SeqCst) >= 3);

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn wait_for_times_out_when_selector_never_appears() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Runtime.evaluate" {
            return vec![json!({
                "id": cmd["id"],
                "result": {"result": {"type": "boolean", "value": false}},
                "sessionId": cmd["sessionId"]
            })];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let err = page
        .wait_for("#never", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, CdpError::Timeout { .. }), "got {err:?}");

    client.close().await.unwrap();
    server.abort();
}

// =============================================================================
// Streaming capture
// =============================================================================

#[tokio::test]
async fn console_capture_normalizes_and_reports_drops() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Test.emit" {
            return vec![
                json!({"id": cmd["id"], "result": {}, "sessionId": cmd["sessionId"]}),
                json!({
                    "method": "Runtime.consoleAPICalled",
                    "params": {"type": "log", "args": [{"type": "string", "value": "hello"}]},
                    "sessionId": cmd["sessionId"]
                }),
                json!({
                    "method": "Log.entryAdded",
                    "params": {"entry": {"level": "warning", "text": "careful"}},
                    "sessionId": cmd["sessionId"]
                }),
            ];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let mut stream = page.capture_console().await.unwrap();

    page.call("Test.emit", None).await.unwrap();

    // The two records come from different subscriptions, so arrival order
    // between them is not fixed; assert on the set.
    let records = [
        stream.next().await.unwrap(),
        stream.next().await.unwrap(),
    ];
    let console = records
        .iter()
        .find(|r| r.method == "Runtime.consoleAPICalled")
        .expect("console record");
    assert_eq!(console.kind, "console");
    assert_eq!(console.text.as_deref(), Some("hello"));

    let log = records
        .iter()
        .find(|r| r.method == "Log.entryAdded")
        .expect("log record");
    assert_eq!(log.level.as_deref(), Some("warning"));
    assert_eq!(log.text.as_deref(), Some("careful"));

    let summary = stream.stop().await;
    assert_eq!(summary.dropped, 0);
    // Stop is idempotent.
    let again = stream.stop().await;
    assert_eq!(again.dropped, 0);

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn capture_stop_disables_domains_it_enabled() {
    static DISABLES: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Network.disable" {
            DISABLES.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let mut stream = page.capture_network().await.unwrap();
    stream.stop().await;
    stream.stop().await;
    assert_eq!(DISABLES.load(std::sync::atomic::Ordering::SeqCst), 1);

    client.close().await.unwrap();
    server.abort();
}

#[tokio::test]
async fn network_capture_preserves_request_response_order() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Test.emit" {
            return vec![
                json!({"id": cmd["id"], "result": {}, "sessionId": cmd["sessionId"]}),
                json!({
                    "method": "Network.requestWillBeSent",
                    "params": {"requestId": "R1", "request": {"url": "https://x/", "method": "GET"}},
                    "sessionId": cmd["sessionId"]
                }),
                json!({
                    "method": "Network.responseReceived",
                    "params": {"requestId": "R1", "response": {"url": "https://x/", "status": 200}},
                    "sessionId": cmd["sessionId"]
                }),
            ];
        }
        attach_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let mut page = client.page("T1").await.unwrap();
    let mut stream = page.capture_network().await.unwrap();

    page.call("Test.emit", None).await.unwrap();

    let first = stream.next().await.unwrap();
    let second = stream.next().await.unwrap();
    assert!(first.method.ends_with("requestWillBeSent"));
    assert!(second.method.ends_with("responseReceived"));
    assert_eq!(first.request_id, second.request_id);
    assert_eq!(second.status, Some(200));

    stream.stop().await;
    client.close().await.unwrap();
    server.abort();
}

// =============================================================================
// Raw escape hatch
// =============================================================================

#[tokio::test]
async fn raw_call_returns_result_blob_unchanged() {
    let (addr, server) = start_server(|cmd| {
        if cmd["method"] == "Custom.method" {
            return vec![json!({
                "id": cmd["id"],
                "result": {"anything": [1, 2, {"nested": true}]}
            })];
        }
        echo_responder(cmd)
    })
    .await;

    let client = connect(addr).await;
    let result = client
        .raw_call("Custom.method", Some(json!({"opaque": "params"})))
        .await
        .unwrap();
    assert_eq!(result, json!({"anything": [1, 2, {"nested": true}]}));

    client.close().await.unwrap();
    server.abort();
}
