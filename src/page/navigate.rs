//! Navigation and history control.

use std::time::Duration;

use serde::Serialize;

use super::Page;
use crate::cdp::{CdpError, EventStream};

/// Result of a `Page.navigate` call.
#[derive(Debug, Clone, Serialize)]
pub struct NavigateResult {
    pub url: String,
    pub frame_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loader_id: Option<String>,
}

impl Page {
    /// Start a navigation and return as soon as the browser accepts it.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` when the browser reports a
    /// navigation error (bad scheme, DNS failure), or any command failure.
    pub async fn navigate(&mut self, url: &str) -> Result<NavigateResult, CdpError> {
        let result = self
            .call("Page.navigate", Some(serde_json::json!({ "url": url })))
            .await?;

        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(CdpError::InvalidArgument(format!(
                    "navigation to {url} failed: {error_text}"
                )));
            }
        }

        Ok(NavigateResult {
            url: url.to_owned(),
            frame_id: result["frameId"].as_str().unwrap_or_default().to_owned(),
            loader_id: result["loaderId"].as_str().map(str::to_owned),
        })
    }

    /// Navigate and return only after the main frame has stopped loading.
    /// Same-document navigations complete via
    /// `Page.navigatedWithinDocument` instead of hanging.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the frame does not finish within
    /// `timeout`, plus anything [`navigate`](Self::navigate) returns.
    pub async fn navigate_and_wait(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigateResult, CdpError> {
        self.ensure_domain("Page").await?;

        // Subscribe before navigating so a fast load cannot slip past.
        let stopped_rx = self.subscribe("Page.frameStoppedLoading").await?;
        let within_rx = self.subscribe("Page.navigatedWithinDocument").await?;

        let result = self.navigate(url).await?;
        await_frame_settled(stopped_rx, within_rx, &result.frame_id, timeout).await?;

        self.disable_domain("Page").await?;
        Ok(result)
    }

    /// Reload the page and wait for its load event.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the load event does not fire within
    /// `timeout`, or any command failure.
    pub async fn reload(&mut self, ignore_cache: bool, timeout: Duration) -> Result<(), CdpError> {
        self.ensure_domain("Page").await?;
        let mut load_rx = self.subscribe("Page.loadEventFired").await?;

        self.call(
            "Page.reload",
            Some(serde_json::json!({ "ignoreCache": ignore_cache })),
        )
        .await?;

        await_one(&mut load_rx, timeout, "page load after reload").await
    }

    /// Go back one entry in the session history.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when already at the start of history,
    /// `CdpError::Timeout` if the navigation does not land within
    /// `timeout`, or any command failure.
    pub async fn back(&mut self, timeout: Duration) -> Result<(), CdpError> {
        self.step_history(-1, timeout).await
    }

    /// Go forward one entry in the session history.
    ///
    /// # Errors
    ///
    /// As [`back`](Self::back), with `NotFound` at the end of history.
    pub async fn forward(&mut self, timeout: Duration) -> Result<(), CdpError> {
        self.step_history(1, timeout).await
    }

    async fn step_history(&mut self, delta: i64, timeout: Duration) -> Result<(), CdpError> {
        self.ensure_domain("Page").await?;

        let history = self.call("Page.getNavigationHistory", None).await?;
        let current = history["currentIndex"].as_i64().unwrap_or(0);
        let entries = history["entries"]
            .as_array()
            .ok_or_else(|| CdpError::Parse("navigation history missing entries".into()))?;

        let index = current + delta;
        let entry = usize::try_from(index)
            .ok()
            .and_then(|i| entries.get(i))
            .ok_or_else(|| {
                CdpError::NotFound(if delta < 0 {
                    "no earlier history entry".into()
                } else {
                    "no later history entry".into()
                })
            })?;
        let entry_id = entry["id"].as_i64().unwrap_or(0);

        let mut nav_rx = self.subscribe("Page.frameNavigated").await?;
        self.call(
            "Page.navigateToHistoryEntry",
            Some(serde_json::json!({ "entryId": entry_id })),
        )
        .await?;

        await_one(&mut nav_rx, timeout, "history navigation").await
    }

    /// Current URL of the top-level frame.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn url(&mut self) -> Result<String, CdpError> {
        let value = self.eval_json("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    /// Current document title.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn title(&mut self) -> Result<String, CdpError> {
        let value = self.eval_json("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }
}

/// Wait for the main frame to settle: `frameStoppedLoading` for the frame
/// we navigated, or `navigatedWithinDocument` for same-document moves.
async fn await_frame_settled(
    mut stopped_rx: EventStream,
    mut within_rx: EventStream,
    frame_id: &str,
    timeout: Duration,
) -> Result<(), CdpError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::select! {
            event = stopped_rx.recv() => {
                match event {
                    Some(event) => {
                        let stopped = event.params["frameId"].as_str().unwrap_or_default();
                        // An empty frame id from Page.navigate matches any.
                        if frame_id.is_empty() || stopped == frame_id {
                            return Ok(());
                        }
                    }
                    None => return Err(CdpError::TransportLost(
                        "event stream closed during navigation".into(),
                    )),
                }
            }
            event = within_rx.recv() => {
                if event.is_some() {
                    return Ok(());
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                return Err(CdpError::timeout("frame to stop loading"));
            }
        }
    }
}

async fn await_one(
    rx: &mut EventStream,
    timeout: Duration,
    what: &str,
) -> Result<(), CdpError> {
    tokio::select! {
        event = rx.recv() => match event {
            Some(_) => Ok(()),
            None => Err(CdpError::TransportLost(format!(
                "event stream closed while waiting for {what}"
            ))),
        },
        () = tokio::time::sleep(timeout) => Err(CdpError::timeout(what)),
    }
}
