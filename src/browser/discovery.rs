use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde::Deserialize;

use super::BrowserError;

/// Browser metadata returned by `GET /json/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Browser product string (e.g. `Chrome/126.0.6478.55`).
    #[serde(rename = "Browser")]
    pub browser: String,

    /// CDP protocol version (e.g. `1.3`).
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,

    /// Browser-level WebSocket debugger URL.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_debugger_url: String,
}

/// One debuggable target from `GET /json` (the legacy list endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    pub id: String,

    /// Target type: `page`, `iframe`, `worker`, `browser`, ...
    #[serde(rename = "type")]
    pub target_type: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    /// WebSocket URL for debugging this specific target.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub ws_debugger_url: Option<String>,
}

/// Query the `/json/version` discovery endpoint.
///
/// # Errors
///
/// Returns `BrowserError::Http` on connection failure or
/// `BrowserError::Parse` if the body is not the expected JSON.
pub async fn query_version(host: &str, port: u16) -> Result<BrowserVersion, BrowserError> {
    let body = http_get(host, port, "/json/version").await?;
    serde_json::from_str(&body).map_err(|e| BrowserError::Parse(e.to_string()))
}

/// Query `/json` for the target list.
///
/// # Errors
///
/// Returns `BrowserError::Http` on connection failure or
/// `BrowserError::Parse` if the body is not the expected JSON.
pub async fn query_targets(host: &str, port: u16) -> Result<Vec<TargetInfo>, BrowserError> {
    let body = http_get(host, port, "/json").await?;
    serde_json::from_str(&body).map_err(|e| BrowserError::Parse(e.to_string()))
}

/// Probe for a running browser on `host:port`. Returns `None` when nothing
/// answers, `Some(version)` when the endpoint responds.
pub async fn detect_running(host: &str, port: u16) -> Option<BrowserVersion> {
    query_version(host, port).await.ok()
}

/// Check whether `buf` holds a complete HTTP response (headers plus the full
/// body per Content-Length).
fn is_response_complete(buf: &[u8]) -> bool {
    let Some(header_end) = find_header_end(buf) else {
        return false;
    };
    let body_start = header_end + 4;
    match parse_content_length(&buf[..header_end]) {
        Some(cl) => buf.len() >= body_start + cl,
        None => true,
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let header_str = std::str::from_utf8(headers).ok()?;
    for line in header_str.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

fn parse_response_body(buf: &[u8]) -> Result<String, BrowserError> {
    let header_end = find_header_end(buf)
        .ok_or_else(|| BrowserError::Http("malformed HTTP response".into()))?;
    let body_start = header_end + 4;

    let headers = std::str::from_utf8(&buf[..header_end])
        .map_err(|e| BrowserError::Http(format!("invalid UTF-8 in headers: {e}")))?;

    let status_line = headers
        .lines()
        .next()
        .ok_or_else(|| BrowserError::Http("empty response".into()))?;
    if !status_line.contains(" 200 ") {
        return Err(BrowserError::Http(format!(
            "unexpected HTTP status: {status_line}"
        )));
    }

    let body_bytes = if let Some(cl) = parse_content_length(&buf[..header_end]) {
        let end = (body_start + cl).min(buf.len());
        &buf[body_start..end]
    } else {
        &buf[body_start..]
    };

    String::from_utf8(body_bytes.to_vec())
        .map_err(|e| BrowserError::Http(format!("invalid UTF-8 in body: {e}")))
}

/// Minimal HTTP GET over a plain TCP stream, run on the blocking pool. The
/// debugging endpoint speaks trivial HTTP/1.1 and some browser builds hold
/// the connection open, so the read stops as soon as Content-Length is
/// satisfied.
async fn http_get(host: &str, port: u16, path: &str) -> Result<String, BrowserError> {
    let addr = format!("{host}:{port}");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");

    tokio::task::spawn_blocking(move || {
        let sock_addr = addr
            .parse()
            .map_err(|e| BrowserError::Http(format!("invalid address {addr}: {e}")))?;
        let mut stream = TcpStream::connect_timeout(&sock_addr, Duration::from_secs(2))
            .map_err(|e| BrowserError::Http(format!("connection failed to {addr}: {e}")))?;

        stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

        stream
            .write_all(request.as_bytes())
            .map_err(|e| BrowserError::Http(format!("write failed: {e}")))?;

        let mut buf = Vec::with_capacity(4096);
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if is_response_complete(&buf) {
                        break;
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if is_response_complete(&buf) {
                        break;
                    }
                    return Err(BrowserError::Http(format!("read timed out: {e}")));
                }
                Err(e) => {
                    return Err(BrowserError::Http(format!("read failed: {e}")));
                }
            }
        }

        parse_response_body(&buf)
    })
    .await
    .map_err(|e| BrowserError::Http(format!("task join failed: {e}")))?
}
