use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

use super::error::CdpError;
use super::transport::{
    EventStream, SessionTable, TransportCommand, TransportHandle, spawn_transport,
};
use super::types::OutboundFrame;
use crate::browser::discovery;

/// Connection settings for a CDP client.
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Timeout for HTTP discovery plus the WebSocket handshake (default 10s).
    pub connect_timeout: Duration,
    /// Deadline applied to each individual command (default 30s).
    pub command_timeout: Duration,
    /// Capacity of the command channel into the transport task (default 256).
    pub channel_capacity: usize,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

/// A CDP client multiplexing commands, responses, and events for any number
/// of targets over one shared WebSocket.
///
/// Sessions are attached on demand via `Target.attachToTarget` with
/// `flatten: true` and cached per target id for the connection's lifetime;
/// the cache entry is invalidated when the transport observes
/// `Target.detachedFromTarget`.
#[derive(Debug)]
pub struct CdpClient {
    handle: TransportHandle,
    config: CdpConfig,
    ws_url: String,
    sessions: SessionTable,
}

impl CdpClient {
    /// Discover the browser-level WebSocket URL via `GET /json/version` and
    /// open the connection.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::ConnectFailed` if discovery or the WebSocket
    /// handshake fails.
    pub async fn connect(host: &str, port: u16, config: CdpConfig) -> Result<Self, CdpError> {
        let version = discovery::query_version(host, port)
            .await
            .map_err(|e| CdpError::ConnectFailed(e.to_string()))?;
        // Browsers report the URL as they see themselves (often 127.0.0.1);
        // when dialing a remote host, keep the host we were asked for.
        let ws_url = rewrite_ws_endpoint(&version.ws_debugger_url, host, port)?;
        Self::connect_ws_url(&ws_url, config).await
    }

    /// Open a connection to an explicit WebSocket debugger URL.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::ConnectFailed` if the handshake fails.
    pub async fn connect_ws_url(ws_url: &str, config: CdpConfig) -> Result<Self, CdpError> {
        let sessions: SessionTable = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let handle = spawn_transport(
            ws_url,
            config.channel_capacity,
            config.connect_timeout,
            Arc::clone(&sessions),
        )
        .await?;

        Ok(Self {
            handle,
            config,
            ws_url: ws_url.to_owned(),
            sessions,
        })
    }

    /// Issue a browser-level command and return the raw result blob.
    ///
    /// This is the escape hatch for methods the high-level layer does not
    /// wrap; the result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` if no response arrives within the
    /// command timeout, `CdpError::Protocol` for a CDP error object, or
    /// `CdpError::TransportLost` once the connection has failed.
    pub async fn raw_call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        send_frame(
            &self.handle,
            self.config.command_timeout,
            method,
            params,
            None,
        )
        .await
    }

    /// Issue a command on a target's session, attaching first if needed.
    ///
    /// # Errors
    ///
    /// As [`raw_call`](Self::raw_call), plus attach failures.
    pub async fn raw_call_session(
        &self,
        target_id: &str,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        let session = self.attach(target_id).await?;
        session.raw_call(method, params).await
    }

    /// Attach to a target and return a session handle. At most one attach is
    /// performed per target per connection; later calls reuse the cached
    /// session id.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Protocol` if the browser refuses the attach, or
    /// `CdpError::Parse` if the response carries no session id.
    pub async fn attach(&self, target_id: &str) -> Result<CdpSession, CdpError> {
        if let Some(session_id) = self.cached_session(target_id) {
            return Ok(self.session_handle(target_id, session_id));
        }

        let result = self
            .raw_call(
                "Target.attachToTarget",
                Some(serde_json::json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
            )
            .await?;
        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| {
                CdpError::Parse("Target.attachToTarget response missing sessionId".into())
            })?
            .to_owned();

        // Write-once per key: the transport may have inserted the id already
        // while routing Target.attachedToTarget; first writer wins either way.
        let session_id = {
            let mut table = self
                .sessions
                .lock()
                .map_err(|_| CdpError::Internal("session table poisoned".into()))?;
            table
                .entry(target_id.to_owned())
                .or_insert(session_id)
                .clone()
        };

        Ok(self.session_handle(target_id, session_id))
    }

    fn cached_session(&self, target_id: &str) -> Option<String> {
        self.sessions.lock().ok()?.get(target_id).cloned()
    }

    fn session_handle(&self, target_id: &str, session_id: String) -> CdpSession {
        CdpSession {
            target_id: target_id.to_owned(),
            session_id,
            handle: self.handle.clone(),
            config: self.config.clone(),
        }
    }

    /// Subscribe to browser-scoped events matching `method` (a name, or a
    /// `Domain.*` prefix).
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn subscribe(&self, method: &str) -> Result<EventStream, CdpError> {
        subscribe_impl(&self.handle, None, method).await
    }

    /// Terminate the connection: every pending request fails with a
    /// connection-lost error and every subscription stream closes.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task already exited.
    pub async fn close(self) -> Result<(), CdpError> {
        self.handle.send(TransportCommand::Shutdown).await
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Number of cached session attachments (test introspection).
    #[must_use]
    pub fn attached_session_count(&self) -> usize {
        self.sessions.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// A session bound to one target, sharing the client's WebSocket. All
/// commands on a target flow through its session.
#[derive(Debug, Clone)]
pub struct CdpSession {
    target_id: String,
    session_id: String,
    handle: TransportHandle,
    config: CdpConfig,
}

impl CdpSession {
    /// Issue a command within this session and return the raw result blob.
    ///
    /// # Errors
    ///
    /// As [`CdpClient::raw_call`].
    pub async fn raw_call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        send_frame(
            &self.handle,
            self.config.command_timeout,
            method,
            params,
            Some(self.session_id.clone()),
        )
        .await
    }

    /// Issue a command with an explicit deadline, for callers running their
    /// own long waits.
    ///
    /// # Errors
    ///
    /// As [`CdpClient::raw_call`].
    pub async fn raw_call_deadline(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        deadline: Instant,
    ) -> Result<serde_json::Value, CdpError> {
        send_frame_deadline(
            &self.handle,
            deadline,
            method,
            params,
            Some(self.session_id.clone()),
        )
        .await
    }

    /// Subscribe to events on this session.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn subscribe(&self, method: &str) -> Result<EventStream, CdpError> {
        subscribe_impl(&self.handle, Some(self.session_id.clone()), method).await
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.config.command_timeout
    }
}

/// Re-point a discovered WebSocket debugger URL at the host and port the
/// caller actually dialed.
fn rewrite_ws_endpoint(ws_url: &str, host: &str, port: u16) -> Result<String, CdpError> {
    let mut url = url::Url::parse(ws_url)
        .map_err(|e| CdpError::ConnectFailed(format!("bad webSocketDebuggerUrl {ws_url:?}: {e}")))?;
    url.set_host(Some(host))
        .map_err(|e| CdpError::ConnectFailed(format!("bad debug host {host:?}: {e}")))?;
    url.set_port(Some(port))
        .map_err(|()| CdpError::ConnectFailed(format!("bad debug port {port}")))?;
    Ok(url.into())
}

async fn send_frame(
    handle: &TransportHandle,
    command_timeout: Duration,
    method: &str,
    params: Option<serde_json::Value>,
    session_id: Option<String>,
) -> Result<serde_json::Value, CdpError> {
    send_frame_deadline(
        handle,
        Instant::now() + command_timeout,
        method,
        params,
        session_id,
    )
    .await
}

async fn send_frame_deadline(
    handle: &TransportHandle,
    deadline: Instant,
    method: &str,
    params: Option<serde_json::Value>,
    session_id: Option<String>,
) -> Result<serde_json::Value, CdpError> {
    let frame = OutboundFrame {
        id: handle.next_message_id(),
        method: method.to_owned(),
        params,
        session_id,
    };

    let (response_tx, response_rx) = oneshot::channel();
    handle
        .send(TransportCommand::Send {
            frame,
            response_tx,
            deadline,
        })
        .await?;

    response_rx
        .await
        .map_err(|_| CdpError::Internal("transport task exited before responding".into()))?
}

async fn subscribe_impl(
    handle: &TransportHandle,
    session_id: Option<String>,
    method: &str,
) -> Result<EventStream, CdpError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    handle
        .send(TransportCommand::Subscribe {
            session_id,
            method: method.to_owned(),
            reply_tx,
        })
        .await?;
    let (id, rx) = reply_rx
        .await
        .map_err(|_| CdpError::Internal("transport task exited during subscribe".into()))?;
    Ok(EventStream::new(id, rx, handle.clone()))
}
