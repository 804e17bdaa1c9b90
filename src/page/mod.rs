//! High-level page operations layered over a target's CDP session.
//!
//! The layer is stateless across public calls: node ids are never cached
//! between operations, and every DOM operation resolves the document
//! afresh.

pub mod capture;
pub mod dom;
pub mod emulate;
pub mod eval;
pub mod input;
pub mod intercept;
pub mod js;
pub mod navigate;
pub mod perf;
pub mod storage;
pub mod targets;
pub mod wait;

use std::collections::HashSet;

use crate::cdp::{CdpClient, CdpError, CdpSession, EventStream};

/// A handle for driving one page target. Wraps the target's session and
/// tracks which CDP domains have been enabled so each domain is enabled at
/// most once per session.
#[derive(Debug)]
pub struct Page {
    session: CdpSession,
    enabled_domains: HashSet<String>,
}

impl CdpClient {
    /// Open a page handle for a target, attaching (or reusing the cached
    /// session) as needed.
    ///
    /// # Errors
    ///
    /// Returns any attach failure from [`CdpClient::attach`].
    pub async fn page(&self, target_id: &str) -> Result<Page, CdpError> {
        Ok(Page::new(self.attach(target_id).await?))
    }
}

impl Page {
    #[must_use]
    pub fn new(session: CdpSession) -> Self {
        Self {
            session,
            enabled_domains: HashSet::new(),
        }
    }

    /// Enable a CDP domain unless it is already enabled on this session.
    ///
    /// # Errors
    ///
    /// Returns any command failure from the enable call.
    pub async fn ensure_domain(&mut self, domain: &str) -> Result<(), CdpError> {
        if self.enabled_domains.contains(domain) {
            return Ok(());
        }
        self.session
            .raw_call(&format!("{domain}.enable"), None)
            .await?;
        self.enabled_domains.insert(domain.to_owned());
        Ok(())
    }

    /// Disable a domain previously enabled through
    /// [`ensure_domain`](Self::ensure_domain). A no-op for domains this
    /// handle never enabled.
    ///
    /// # Errors
    ///
    /// Returns any command failure from the disable call.
    pub async fn disable_domain(&mut self, domain: &str) -> Result<(), CdpError> {
        if !self.enabled_domains.remove(domain) {
            return Ok(());
        }
        self.session
            .raw_call(&format!("{domain}.disable"), None)
            .await?;
        Ok(())
    }

    /// Whether this handle enabled the domain.
    #[must_use]
    pub fn domain_enabled(&self, domain: &str) -> bool {
        self.enabled_domains.contains(domain)
    }

    /// Drop a domain from the enabled set without disabling it, handing
    /// ownership of the disable to someone else (a capture stream).
    pub(crate) fn forget_domain(&mut self, domain: &str) -> bool {
        self.enabled_domains.remove(domain)
    }

    /// Issue a session-scoped command.
    ///
    /// # Errors
    ///
    /// As [`CdpSession::raw_call`].
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        self.session.raw_call(method, params).await
    }

    /// Subscribe to events on this page's session.
    ///
    /// # Errors
    ///
    /// As [`CdpSession::subscribe`].
    pub async fn subscribe(&self, method: &str) -> Result<EventStream, CdpError> {
        self.session.subscribe(method).await
    }

    #[must_use]
    pub fn session(&self) -> &CdpSession {
        &self.session
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        self.session.target_id()
    }
}
