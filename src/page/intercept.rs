//! Request interception (`Fetch` domain) and URL blocking.

use base64::Engine;
use globset::{Glob, GlobMatcher};

use super::Page;
use crate::cdp::{CdpError, CdpSession, EventStream};

/// A body replacement, written on the command line as `old:new` and split
/// on the first colon. Values containing colons keep everything after the
/// first as the replacement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub old: String,
    pub new: String,
}

/// Parse an `old:new` replacement.
///
/// # Errors
///
/// Returns `CdpError::InvalidArgument` when the input has no colon or an
/// empty search string.
pub fn parse_replacement(input: &str) -> Result<Replacement, CdpError> {
    let (old, new) = input.split_once(':').ok_or_else(|| {
        CdpError::InvalidArgument(format!("replacement must be old:new, got {input:?}"))
    })?;
    if old.is_empty() {
        return Err(CdpError::InvalidArgument(format!(
            "replacement search text is empty: {input:?}"
        )));
    }
    Ok(Replacement {
        old: old.to_owned(),
        new: new.to_owned(),
    })
}

fn apply_replacements(text: &str, replacements: &[Replacement]) -> String {
    let mut out = text.to_owned();
    for replacement in replacements {
        out = out.replace(&replacement.old, &replacement.new);
    }
    out
}

/// Settings for one interception rule.
#[derive(Debug, Clone)]
pub struct InterceptRule {
    /// Glob over request URLs; only matching requests are touched.
    pub pattern: String,
    /// Pause at the response stage so the body can be rewritten. Without
    /// this, matching requests pause at the request stage and are passed
    /// through untouched.
    pub on_response: bool,
    pub replacements: Vec<Replacement>,
}

/// A live interception: owns the paused-event loop. Disable with
/// [`stop`](Self::stop); callers should stop on every exit path.
pub struct InterceptHandle {
    session: CdpSession,
    task: tokio::task::JoinHandle<()>,
    stopped: bool,
}

impl InterceptHandle {
    /// Disable interception: issues `Fetch.disable` and tears down the
    /// event loop. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns any command failure from `Fetch.disable`.
    pub async fn stop(&mut self) -> Result<(), CdpError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.task.abort();
        self.session.raw_call("Fetch.disable", None).await?;
        Ok(())
    }
}

impl Drop for InterceptHandle {
    fn drop(&mut self) {
        if !self.stopped {
            self.task.abort();
        }
    }
}

impl Page {
    /// Enable request interception for URLs matching the rule's glob.
    /// Matching responses have the replacements applied to their body and
    /// are fulfilled in place; everything else continues untouched.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for a malformed glob, or any
    /// command failure from `Fetch.enable`.
    pub async fn enable_intercept(
        &mut self,
        rule: InterceptRule,
    ) -> Result<InterceptHandle, CdpError> {
        let matcher = Glob::new(&rule.pattern)
            .map_err(|e| CdpError::InvalidArgument(format!("bad glob {:?}: {e}", rule.pattern)))?
            .compile_matcher();

        let stage = if rule.on_response { "Response" } else { "Request" };
        self.call(
            "Fetch.enable",
            Some(serde_json::json!({
                "patterns": [{ "urlPattern": "*", "requestStage": stage }],
            })),
        )
        .await?;

        let events = self.subscribe("Fetch.requestPaused").await?;
        let session = self.session().clone();
        let task = tokio::spawn(run_intercept_loop(
            events,
            session.clone(),
            matcher,
            rule.replacements,
        ));

        Ok(InterceptHandle {
            session,
            task,
            stopped: false,
        })
    }

    /// Block requests whose URLs match any of the patterns
    /// (`Network.setBlockedURLs` wildcards).
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn block_urls(&mut self, patterns: &[String]) -> Result<(), CdpError> {
        self.ensure_domain("Network").await?;
        self.call(
            "Network.setBlockedURLs",
            Some(serde_json::json!({ "urls": patterns })),
        )
        .await?;
        Ok(())
    }

    /// Clear the blocked URL list.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn unblock_urls(&mut self) -> Result<(), CdpError> {
        self.block_urls(&[]).await
    }
}

async fn run_intercept_loop(
    mut events: EventStream,
    session: CdpSession,
    matcher: GlobMatcher,
    replacements: Vec<Replacement>,
) {
    while let Some(event) = events.recv().await {
        if let Err(e) = handle_paused(&session, &matcher, &replacements, &event.params).await {
            tracing::debug!("intercept continue failed: {e}");
        }
    }
}

async fn handle_paused(
    session: &CdpSession,
    matcher: &GlobMatcher,
    replacements: &[Replacement],
    params: &serde_json::Value,
) -> Result<(), CdpError> {
    let Some(request_id) = params["requestId"].as_str() else {
        return Ok(());
    };
    let url = params["request"]["url"].as_str().unwrap_or_default();
    let at_response = params["responseStatusCode"].is_i64() || params["responseStatusCode"].is_u64();

    if !matcher.is_match(url) || !at_response || replacements.is_empty() {
        session
            .raw_call(
                "Fetch.continueRequest",
                Some(serde_json::json!({ "requestId": request_id })),
            )
            .await?;
        return Ok(());
    }

    // Rewrite the body and fulfil in place.
    let body_result = session
        .raw_call(
            "Fetch.getResponseBody",
            Some(serde_json::json!({ "requestId": request_id })),
        )
        .await?;
    let raw = body_result["body"].as_str().unwrap_or_default();
    let body = if body_result["base64Encoded"].as_bool() == Some(true) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|e| CdpError::Parse(format!("response body base64: {e}")))?;
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        raw.to_owned()
    };

    let rewritten = apply_replacements(&body, replacements);
    let status = params["responseStatusCode"].as_u64().unwrap_or(200);

    // Carry the original headers minus content-length, which no longer
    // matches the rewritten body.
    let headers: Vec<serde_json::Value> = params["responseHeaders"]
        .as_array()
        .map(|headers| {
            headers
                .iter()
                .filter(|h| {
                    !h["name"]
                        .as_str()
                        .unwrap_or_default()
                        .eq_ignore_ascii_case("content-length")
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    session
        .raw_call(
            "Fetch.fulfillRequest",
            Some(serde_json::json!({
                "requestId": request_id,
                "responseCode": status,
                "responseHeaders": headers,
                "body": base64::engine::general_purpose::STANDARD.encode(rewritten),
            })),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_replacement_splits_on_first_colon() {
        let r = parse_replacement("http://old:http://new").unwrap();
        assert_eq!(r.old, "http");
        assert_eq!(r.new, "//old:http://new");
    }

    #[test]
    fn parse_replacement_simple() {
        let r = parse_replacement("foo:bar").unwrap();
        assert_eq!(r.old, "foo");
        assert_eq!(r.new, "bar");
    }

    #[test]
    fn parse_replacement_empty_new_is_deletion() {
        let r = parse_replacement("remove-me:").unwrap();
        assert_eq!(r.new, "");
    }

    #[test]
    fn parse_replacement_rejects_no_colon() {
        assert!(matches!(
            parse_replacement("no-colon"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parse_replacement_rejects_empty_old() {
        assert!(matches!(
            parse_replacement(":new"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn replacements_apply_in_order() {
        let replacements = vec![
            Replacement {
                old: "alpha".into(),
                new: "beta".into(),
            },
            Replacement {
                old: "beta".into(),
                new: "gamma".into(),
            },
        ];
        // Sequential application: alpha → beta, then all betas → gamma.
        assert_eq!(apply_replacements("alpha beta", &replacements), "gamma gamma");
    }

    #[test]
    fn replacements_noop_without_match() {
        let replacements = vec![Replacement {
            old: "missing".into(),
            new: "x".into(),
        }];
        assert_eq!(apply_replacements("unchanged", &replacements), "unchanged");
    }

    #[test]
    fn glob_matches_urls() {
        let matcher = Glob::new("https://api.example.com/*")
            .unwrap()
            .compile_matcher();
        assert!(matcher.is_match("https://api.example.com/v1/users"));
        assert!(!matcher.is_match("https://cdn.example.com/app.js"));
    }
}
