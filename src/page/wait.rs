//! The wait family. Every wait takes one timeout, succeeds immediately if
//! its condition already holds, and fails with a timeout error once the
//! deadline passes.

use std::time::Duration;

use super::{Page, js};
use crate::cdp::CdpError;

/// Initial delay of the poll loop; doubles per round.
const POLL_INITIAL: Duration = Duration::from_millis(25);
/// Poll back-off ceiling.
const POLL_MAX: Duration = Duration::from_millis(250);

/// Deadline/back-off bookkeeping shared by the polling waits.
struct PollClock {
    deadline: tokio::time::Instant,
    backoff: Duration,
}

impl PollClock {
    fn new(timeout: Duration) -> Self {
        Self {
            deadline: tokio::time::Instant::now() + timeout,
            backoff: POLL_INITIAL,
        }
    }

    /// Sleep until the next poll round. Returns `false` when the deadline
    /// has passed.
    async fn tick(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        if now >= self.deadline {
            return false;
        }
        let sleep_for = self.backoff.min(self.deadline - now);
        tokio::time::sleep(sleep_for).await;
        self.backoff = (self.backoff * 2).min(POLL_MAX);
        true
    }
}

impl Page {
    /// Wait for a selector to match at least one element.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), CdpError> {
        let expr = js::selector_exists(selector);
        let mut clock = PollClock::new(timeout);
        loop {
            if self.eval_json(&expr).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(CdpError::timeout(format!("selector {selector:?}")));
            }
        }
    }

    /// Wait for a selector to match nothing.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_gone(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), CdpError> {
        let expr = js::selector_exists(selector);
        let mut clock = PollClock::new(timeout);
        loop {
            if self.eval_json(&expr).await?.as_bool() == Some(false) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(CdpError::timeout(format!(
                    "selector {selector:?} to disappear"
                )));
            }
        }
    }

    /// Wait for a substring to appear in the page's visible text.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_text(&mut self, needle: &str, timeout: Duration) -> Result<(), CdpError> {
        let expr = js::body_inner_text();
        let mut clock = PollClock::new(timeout);
        loop {
            let text = self.eval_json(&expr).await?;
            if text.as_str().is_some_and(|t| t.contains(needle)) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(CdpError::timeout(format!("text {needle:?}")));
            }
        }
    }

    /// Wait for an expression to evaluate truthy.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first, or any
    /// evaluation failure (a throwing expression fails fast).
    pub async fn wait_for_fn(
        &mut self,
        expression: &str,
        timeout: Duration,
    ) -> Result<(), CdpError> {
        let wrapped = format!("(function() {{ return Boolean({expression}); }})()");
        let mut clock = PollClock::new(timeout);
        loop {
            if self.eval_json(&wrapped).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(CdpError::timeout(format!("expression {expression:?}")));
            }
        }
    }

    /// Wait for the main frame URL to contain a literal substring (no
    /// globbing, no regex).
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_url(&mut self, pattern: &str, timeout: Duration) -> Result<(), CdpError> {
        let mut clock = PollClock::new(timeout);
        loop {
            let url = self.eval_json("location.href").await?;
            if url.as_str().is_some_and(|u| u.contains(pattern)) {
                return Ok(());
            }
            if !clock.tick().await {
                return Err(CdpError::timeout(format!("url containing {pattern:?}")));
            }
        }
    }

    /// Wait for the next main-frame navigation.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_navigation(&mut self, timeout: Duration) -> Result<String, CdpError> {
        self.ensure_domain("Page").await?;
        let mut rx = self.subscribe("Page.frameNavigated").await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        return Err(CdpError::TransportLost(
                            "event stream closed while waiting for navigation".into(),
                        ));
                    };
                    // The main frame has no parent.
                    if event.params["frame"]["parentId"].as_str().is_none() {
                        let url = event.params["frame"]["url"]
                            .as_str()
                            .unwrap_or_default()
                            .to_owned();
                        return Ok(url);
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(CdpError::timeout("navigation"));
                }
            }
        }
    }

    /// Wait for the first request whose URL contains the pattern. Returns
    /// the `Network.requestWillBeSent` parameters.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_request(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, CdpError> {
        self.wait_for_network_event("Network.requestWillBeSent", pattern, timeout)
            .await
    }

    /// Wait for the first response whose URL contains the pattern. Returns
    /// the `Network.responseReceived` parameters.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the deadline passes first.
    pub async fn wait_for_response(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, CdpError> {
        self.wait_for_network_event("Network.responseReceived", pattern, timeout)
            .await
    }

    async fn wait_for_network_event(
        &mut self,
        method: &str,
        pattern: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, CdpError> {
        self.ensure_domain("Network").await?;
        let mut rx = self.subscribe(method).await?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        return Err(CdpError::TransportLost(format!(
                            "event stream closed while waiting for {method}"
                        )));
                    };
                    if network_event_url(&event.params).contains(pattern) {
                        return Ok(event.params);
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(CdpError::timeout(format!("{method} matching {pattern:?}")));
                }
            }
        }
    }

    /// Wait until no request has been in flight for `idle_window`
    /// continuously. In-flight counting is maintained from
    /// `requestWillBeSent`, `loadingFinished`, and `loadingFailed`.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Timeout` when the overall deadline passes before
    /// an idle window completes.
    pub async fn wait_for_network_idle(
        &mut self,
        idle_window: Duration,
        timeout: Duration,
    ) -> Result<(), CdpError> {
        self.ensure_domain("Network").await?;
        let mut req_rx = self.subscribe("Network.requestWillBeSent").await?;
        let mut fin_rx = self.subscribe("Network.loadingFinished").await?;
        let mut fail_rx = self.subscribe("Network.loadingFailed").await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut in_flight: i64 = 0;
        let idle_timer = tokio::time::sleep(idle_window);
        tokio::pin!(idle_timer);

        loop {
            tokio::select! {
                event = req_rx.recv() => {
                    if event.is_some() {
                        in_flight += 1;
                        idle_timer
                            .as_mut()
                            .reset(tokio::time::Instant::now() + idle_window);
                    }
                }
                event = fin_rx.recv() => {
                    if event.is_some() {
                        in_flight = (in_flight - 1).max(0);
                        if in_flight == 0 {
                            idle_timer
                                .as_mut()
                                .reset(tokio::time::Instant::now() + idle_window);
                        }
                    }
                }
                event = fail_rx.recv() => {
                    if event.is_some() {
                        in_flight = (in_flight - 1).max(0);
                        if in_flight == 0 {
                            idle_timer
                                .as_mut()
                                .reset(tokio::time::Instant::now() + idle_window);
                        }
                    }
                }
                () = &mut idle_timer => {
                    if in_flight == 0 {
                        return Ok(());
                    }
                    idle_timer
                        .as_mut()
                        .reset(tokio::time::Instant::now() + idle_window);
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(CdpError::timeout("network idle"));
                }
            }
        }
    }
}

/// URL field of a `Network.*` event, wherever the event variant carries it.
fn network_event_url(params: &serde_json::Value) -> &str {
    params["request"]["url"]
        .as_str()
        .or_else(|| params["response"]["url"].as_str())
        .unwrap_or_default()
}
