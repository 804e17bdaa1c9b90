//! Streaming capture: bounded streams of normalised console, exception,
//! and network events with an explicit, idempotent stop.

use serde::Serialize;

use crate::cdp::{CdpError, CdpSession, Event, EventStream};
use crate::page::Page;

/// What a capture stream is recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Console,
    Exceptions,
    Network,
}

/// A normalised event record with a stable shape across protocol
/// versions. Raw parameters remain available under `details`.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    /// Record family: `console`, `exception`, or `network`.
    pub kind: &'static str,
    /// The raw CDP event method this was derived from.
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u64>,
    pub details: serde_json::Value,
}

/// Trailing diagnostics reported when a capture stops.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CaptureSummary {
    /// Events discarded because the subscriber's buffer was full.
    pub dropped: u64,
}

/// A live capture: owns its subscriptions and the set of domains it
/// enabled. Callers must invoke [`stop`](Self::stop) on every exit path;
/// it is idempotent.
pub struct CaptureStream {
    kind: CaptureKind,
    primary: EventStream,
    secondary: Option<EventStream>,
    session: CdpSession,
    /// Domains enabled exclusively for this capture, disabled on stop.
    enabled_domains: Vec<String>,
    stopped: Option<CaptureSummary>,
}

impl CaptureStream {
    /// Receive the next normalised record, in browser-delivery order.
    /// Returns `None` once the capture is stopped or the connection is
    /// gone.
    pub async fn next(&mut self) -> Option<CaptureRecord> {
        loop {
            let event = match &mut self.secondary {
                Some(secondary) => tokio::select! {
                    event = self.primary.recv() => event,
                    event = secondary.recv() => event,
                },
                None => self.primary.recv().await,
            };
            let event = event?;
            if let Some(record) = normalize(self.kind, &event) {
                return Some(record);
            }
        }
    }

    /// Stop the capture: unsubscribe, disable the domains this capture
    /// enabled, and report the drop count. Safe to call repeatedly; later
    /// calls return the first summary.
    pub async fn stop(&mut self) -> CaptureSummary {
        if let Some(summary) = self.stopped {
            return summary;
        }

        self.primary.stop().await;
        let mut dropped = self.primary.dropped();
        if let Some(secondary) = &mut self.secondary {
            secondary.stop().await;
            dropped += secondary.dropped();
        }

        for domain in &self.enabled_domains {
            // Best-effort: the session may already be gone.
            let _ = self
                .session
                .raw_call(&format!("{domain}.disable"), None)
                .await;
        }

        let summary = CaptureSummary { dropped };
        self.stopped = Some(summary);
        summary
    }
}

impl Page {
    /// Capture console output: `Runtime.consoleAPICalled`,
    /// `Log.entryAdded`, and `Runtime.exceptionThrown` coalesced into one
    /// record shape tagged by level.
    ///
    /// # Errors
    ///
    /// Returns any command failure while enabling domains or subscribing.
    pub async fn capture_console(&mut self) -> Result<CaptureStream, CdpError> {
        let enabled = self.enable_for_capture(&["Runtime", "Log"]).await?;
        let primary = self.subscribe("Runtime.*").await?;
        let secondary = Some(self.subscribe("Log.entryAdded").await?);
        Ok(self.capture_stream(CaptureKind::Console, primary, secondary, enabled))
    }

    /// Capture uncaught exceptions only.
    ///
    /// # Errors
    ///
    /// Returns any command failure while enabling domains or subscribing.
    pub async fn capture_exceptions(&mut self) -> Result<CaptureStream, CdpError> {
        let enabled = self.enable_for_capture(&["Runtime"]).await?;
        let primary = self.subscribe("Runtime.exceptionThrown").await?;
        Ok(self.capture_stream(CaptureKind::Exceptions, primary, None, enabled))
    }

    /// Capture network lifecycle events: requests, responses, and load
    /// completion/failure.
    ///
    /// # Errors
    ///
    /// Returns any command failure while enabling domains or subscribing.
    pub async fn capture_network(&mut self) -> Result<CaptureStream, CdpError> {
        let enabled = self.enable_for_capture(&["Network"]).await?;
        let primary = self.subscribe("Network.*").await?;
        Ok(self.capture_stream(CaptureKind::Network, primary, None, enabled))
    }

    /// Enable each domain, remembering which ones this capture switched on
    /// so stop can switch exactly those off again.
    async fn enable_for_capture(&mut self, domains: &[&str]) -> Result<Vec<String>, CdpError> {
        let mut newly_enabled = Vec::new();
        for domain in domains {
            if !self.domain_enabled(domain) {
                self.ensure_domain(domain).await?;
                newly_enabled.push((*domain).to_owned());
            }
        }
        Ok(newly_enabled)
    }

    fn capture_stream(
        &mut self,
        kind: CaptureKind,
        primary: EventStream,
        secondary: Option<EventStream>,
        enabled_domains: Vec<String>,
    ) -> CaptureStream {
        // The capture owns the disable half of these domains now.
        for domain in &enabled_domains {
            let _ = self.forget_domain(domain);
        }
        CaptureStream {
            kind,
            primary,
            secondary,
            session: self.session().clone(),
            enabled_domains,
            stopped: None,
        }
    }
}

fn normalize(kind: CaptureKind, event: &Event) -> Option<CaptureRecord> {
    match kind {
        CaptureKind::Console => normalize_console(event),
        CaptureKind::Exceptions => {
            (event.method == "Runtime.exceptionThrown").then(|| exception_record(event))
        }
        CaptureKind::Network => normalize_network(event),
    }
}

fn normalize_console(event: &Event) -> Option<CaptureRecord> {
    match event.method.as_str() {
        "Runtime.consoleAPICalled" => {
            let level = event.params["type"].as_str().unwrap_or("log");
            Some(CaptureRecord {
                kind: "console",
                method: event.method.clone(),
                level: Some(normalize_level(level).to_owned()),
                text: Some(join_console_args(&event.params["args"])),
                url: None,
                request_id: None,
                status: None,
                details: event.params.clone(),
            })
        }
        "Log.entryAdded" => {
            let entry = &event.params["entry"];
            Some(CaptureRecord {
                kind: "console",
                method: event.method.clone(),
                level: Some(
                    normalize_level(entry["level"].as_str().unwrap_or("info")).to_owned(),
                ),
                text: Some(entry["text"].as_str().unwrap_or_default().to_owned()),
                url: entry["url"].as_str().map(str::to_owned),
                request_id: None,
                status: None,
                details: event.params.clone(),
            })
        }
        "Runtime.exceptionThrown" => Some(exception_record(event)),
        _ => None,
    }
}

fn exception_record(event: &Event) -> CaptureRecord {
    let details = &event.params["exceptionDetails"];
    let text = details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("uncaught exception");
    CaptureRecord {
        kind: "exception",
        method: event.method.clone(),
        level: Some("error".to_owned()),
        text: Some(text.to_owned()),
        url: details["url"].as_str().map(str::to_owned),
        request_id: None,
        status: None,
        details: event.params.clone(),
    }
}

fn normalize_network(event: &Event) -> Option<CaptureRecord> {
    let request_id = event.params["requestId"].as_str().map(str::to_owned);
    match event.method.as_str() {
        "Network.requestWillBeSent" => Some(CaptureRecord {
            kind: "network",
            method: event.method.clone(),
            level: None,
            text: event.params["request"]["method"].as_str().map(str::to_owned),
            url: event.params["request"]["url"].as_str().map(str::to_owned),
            request_id,
            status: None,
            details: event.params.clone(),
        }),
        "Network.responseReceived" => Some(CaptureRecord {
            kind: "network",
            method: event.method.clone(),
            level: None,
            text: None,
            url: event.params["response"]["url"].as_str().map(str::to_owned),
            request_id,
            status: event.params["response"]["status"].as_u64(),
            details: event.params.clone(),
        }),
        "Network.loadingFailed" => Some(CaptureRecord {
            kind: "network",
            method: event.method.clone(),
            level: Some("error".to_owned()),
            text: event.params["errorText"].as_str().map(str::to_owned),
            url: None,
            request_id,
            status: None,
            details: event.params.clone(),
        }),
        "Network.loadingFinished" => Some(CaptureRecord {
            kind: "network",
            method: event.method.clone(),
            level: None,
            text: None,
            url: None,
            request_id,
            status: None,
            details: event.params.clone(),
        }),
        _ => None,
    }
}

/// Collapse protocol-specific level spellings onto one set.
fn normalize_level(level: &str) -> &'static str {
    match level {
        "warning" | "warn" => "warning",
        "error" | "assert" => "error",
        "debug" | "verbose" => "debug",
        "info" => "info",
        _ => "log",
    }
}

fn join_console_args(args: &serde_json::Value) -> String {
    args.as_array()
        .map(|args| {
            args.iter()
                .map(|arg| {
                    arg["value"]
                        .as_str()
                        .map(str::to_owned)
                        .or_else(|| arg["description"].as_str().map(str::to_owned))
                        .unwrap_or_else(|| {
                            serde_json::to_string(&arg["value"]).unwrap_or_default()
                        })
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(method: &str, params: serde_json::Value) -> Event {
        Event {
            method: method.to_owned(),
            params,
            session_id: Some("s".to_owned()),
        }
    }

    #[test]
    fn console_api_call_normalizes_level_and_text() {
        let record = normalize(
            CaptureKind::Console,
            &event(
                "Runtime.consoleAPICalled",
                json!({
                    "type": "warning",
                    "args": [
                        {"type": "string", "value": "disk"},
                        {"type": "number", "value": 97}
                    ]
                }),
            ),
        )
        .unwrap();
        assert_eq!(record.kind, "console");
        assert_eq!(record.level.as_deref(), Some("warning"));
        assert_eq!(record.text.as_deref(), Some("disk 97"));
    }

    #[test]
    fn log_entry_coalesces_into_console_record() {
        let record = normalize(
            CaptureKind::Console,
            &event(
                "Log.entryAdded",
                json!({
                    "entry": {
                        "level": "error",
                        "text": "mixed content",
                        "url": "https://example.com/"
                    }
                }),
            ),
        )
        .unwrap();
        assert_eq!(record.kind, "console");
        assert_eq!(record.level.as_deref(), Some("error"));
        assert_eq!(record.text.as_deref(), Some("mixed content"));
        assert_eq!(record.url.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn exception_coalesces_into_console_record() {
        let record = normalize(
            CaptureKind::Console,
            &event(
                "Runtime.exceptionThrown",
                json!({
                    "exceptionDetails": {
                        "text": "Uncaught",
                        "exception": {"description": "TypeError: x is not a function"}
                    }
                }),
            ),
        )
        .unwrap();
        assert_eq!(record.kind, "exception");
        assert_eq!(record.level.as_deref(), Some("error"));
        assert!(record.text.unwrap().contains("TypeError"));
    }

    #[test]
    fn unrelated_runtime_events_are_filtered() {
        assert!(
            normalize(
                CaptureKind::Console,
                &event("Runtime.executionContextCreated", json!({})),
            )
            .is_none()
        );
    }

    #[test]
    fn exceptions_capture_ignores_console_calls() {
        assert!(
            normalize(
                CaptureKind::Exceptions,
                &event("Runtime.consoleAPICalled", json!({"type": "log"})),
            )
            .is_none()
        );
    }

    #[test]
    fn network_request_and_response_share_request_id() {
        let request = normalize(
            CaptureKind::Network,
            &event(
                "Network.requestWillBeSent",
                json!({
                    "requestId": "R1",
                    "request": {"url": "https://example.com/api", "method": "GET"}
                }),
            ),
        )
        .unwrap();
        let response = normalize(
            CaptureKind::Network,
            &event(
                "Network.responseReceived",
                json!({
                    "requestId": "R1",
                    "response": {"url": "https://example.com/api", "status": 200}
                }),
            ),
        )
        .unwrap();
        assert_eq!(request.request_id, response.request_id);
        assert_eq!(response.status, Some(200));
        assert!(request.method.ends_with("requestWillBeSent"));
        assert!(response.method.ends_with("responseReceived"));
    }

    #[test]
    fn network_loading_failed_is_an_error_record() {
        let record = normalize(
            CaptureKind::Network,
            &event(
                "Network.loadingFailed",
                json!({"requestId": "R2", "errorText": "net::ERR_CONNECTION_REFUSED"}),
            ),
        )
        .unwrap();
        assert_eq!(record.level.as_deref(), Some("error"));
        assert!(record.text.unwrap().contains("REFUSED"));
    }

    #[test]
    fn network_data_received_is_filtered() {
        assert!(
            normalize(
                CaptureKind::Network,
                &event("Network.dataReceived", json!({"requestId": "R3"})),
            )
            .is_none()
        );
    }

    #[test]
    fn level_spellings_collapse() {
        assert_eq!(normalize_level("warn"), "warning");
        assert_eq!(normalize_level("warning"), "warning");
        assert_eq!(normalize_level("assert"), "error");
        assert_eq!(normalize_level("verbose"), "debug");
        assert_eq!(normalize_level("anything-else"), "log");
    }

    #[test]
    fn record_serializes_without_empty_fields() {
        let record = CaptureRecord {
            kind: "network",
            method: "Network.loadingFinished".into(),
            level: None,
            text: None,
            url: None,
            request_id: Some("R1".into()),
            status: None,
            details: json!({}),
        };
        let out: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(out.get("level").is_none());
        assert_eq!(out["request_id"], "R1");
    }
}
