use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing CDP frame (client to browser).
#[derive(Debug, Serialize)]
pub struct OutboundFrame {
    /// Monotonic message id for response correlation. Never reused within a
    /// connection.
    pub id: u64,
    /// CDP method name (e.g. `Page.navigate`).
    pub method: String,
    /// Method parameters, omitted when the method takes none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Session id for session-scoped commands; absent for browser-level.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Raw incoming frame before classification. The union of response and
/// event fields; every inbound WebSocket message is deserialized into this
/// first and then split via [`classify`](Self::classify).
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub id: Option<u64>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<ProtocolError>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP protocol error payload attached to a failed command response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// A response to a previously issued command.
#[derive(Debug)]
pub struct Response {
    pub id: u64,
    pub result: Result<Value, ProtocolError>,
}

/// An asynchronous event pushed by the browser.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event method name (e.g. `Network.responseReceived`).
    pub method: String,
    pub params: Value,
    /// Session id for session-scoped events; `None` for browser-scoped.
    pub session_id: Option<String>,
}

/// Classification of an inbound frame.
pub enum FrameKind {
    Response(Response),
    Event(Event),
}

impl InboundFrame {
    /// Split this frame into a response (has `id`) or event (has `method`
    /// but no `id`). Returns `None` for frames that are neither.
    #[must_use]
    pub fn classify(self) -> Option<FrameKind> {
        if let Some(id) = self.id {
            let result = match self.error {
                Some(error) => Err(error),
                None => Ok(self.result.unwrap_or(Value::Null)),
            };
            Some(FrameKind::Response(Response { id, result }))
        } else if let Some(method) = self.method {
            Some(FrameKind::Event(Event {
                method,
                params: self.params.unwrap_or(Value::Null),
                session_id: self.session_id,
            }))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_browser_level_frame() {
        let frame = OutboundFrame {
            id: 1,
            method: "Browser.getVersion".into(),
            params: None,
            session_id: None,
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "Browser.getVersion");
        assert!(json.get("params").is_none());
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn serialize_session_scoped_frame() {
        let frame = OutboundFrame {
            id: 7,
            method: "Runtime.evaluate".into(),
            params: Some(json!({"expression": "1+1", "returnByValue": true})),
            session_id: Some("sess-1".into()),
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["sessionId"], "sess-1");
        assert_eq!(json["params"]["expression"], "1+1");
    }

    #[test]
    fn classify_success_response() {
        let raw: InboundFrame =
            serde_json::from_str(r#"{"id": 3, "result": {"frameId": "F1"}}"#).unwrap();
        let Some(FrameKind::Response(resp)) = raw.classify() else {
            panic!("expected response");
        };
        assert_eq!(resp.id, 3);
        assert_eq!(resp.result.unwrap()["frameId"], "F1");
    }

    #[test]
    fn classify_error_response() {
        let raw: InboundFrame = serde_json::from_str(
            r#"{"id": 4, "error": {"code": -32601, "message": "method not found"}}"#,
        )
        .unwrap();
        let Some(FrameKind::Response(resp)) = raw.classify() else {
            panic!("expected response");
        };
        let err = resp.result.unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "method not found");
    }

    #[test]
    fn classify_session_event() {
        let raw: InboundFrame = serde_json::from_str(
            r#"{"method": "Page.frameNavigated", "params": {"frame": {}}, "sessionId": "s"}"#,
        )
        .unwrap();
        let Some(FrameKind::Event(event)) = raw.classify() else {
            panic!("expected event");
        };
        assert_eq!(event.method, "Page.frameNavigated");
        assert_eq!(event.session_id.as_deref(), Some("s"));
    }

    #[test]
    fn classify_browser_event_has_no_session() {
        let raw: InboundFrame = serde_json::from_str(
            r#"{"method": "Target.targetCreated", "params": {"targetInfo": {}}}"#,
        )
        .unwrap();
        let Some(FrameKind::Event(event)) = raw.classify() else {
            panic!("expected event");
        };
        assert!(event.session_id.is_none());
    }

    #[test]
    fn classify_response_without_result_yields_null() {
        let raw: InboundFrame = serde_json::from_str(r#"{"id": 9}"#).unwrap();
        let Some(FrameKind::Response(resp)) = raw.classify() else {
            panic!("expected response");
        };
        assert_eq!(resp.result.unwrap(), Value::Null);
    }

    #[test]
    fn classify_empty_frame_is_none() {
        let raw: InboundFrame = serde_json::from_str("{}").unwrap();
        assert!(raw.classify().is_none());
    }
}
