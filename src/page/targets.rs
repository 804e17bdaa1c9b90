//! Target discovery and lifecycle via the browser-level `Target` domain.

use serde::Serialize;

use crate::cdp::{CdpClient, CdpError};

/// A debuggable entity exposed by the browser.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: String,
    /// `page`, `iframe`, `worker`, `browser`, ...
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

impl Target {
    fn from_info(info: &serde_json::Value) -> Option<Self> {
        Some(Self {
            id: info["targetId"].as_str()?.to_owned(),
            target_type: info["type"].as_str().unwrap_or_default().to_owned(),
            title: info["title"].as_str().unwrap_or_default().to_owned(),
            url: info["url"].as_str().unwrap_or_default().to_owned(),
            attached: info["attached"].as_bool().unwrap_or(false),
        })
    }
}

/// Select a target from a list by an optional spec:
///
/// - `None` → first `page`-type target
/// - `Some(n)` where `n` parses as a number → index into the list
/// - `Some(id)` → exact target id match
///
/// # Errors
///
/// Returns `CdpError::NotFound` when nothing matches.
pub fn select_target<'a>(targets: &'a [Target], spec: Option<&str>) -> Result<&'a Target, CdpError> {
    match spec {
        None => targets
            .iter()
            .find(|t| t.target_type == "page")
            .ok_or_else(|| CdpError::NotFound("no page targets open".into())),
        Some(value) => {
            if let Ok(index) = value.parse::<usize>() {
                return targets
                    .get(index)
                    .ok_or_else(|| CdpError::NotFound(format!("target index {index} out of range")));
            }
            targets
                .iter()
                .find(|t| t.id == value)
                .ok_or_else(|| CdpError::NotFound(format!("target {value}")))
        }
    }
}

impl CdpClient {
    /// List all targets known to the browser.
    ///
    /// # Errors
    ///
    /// Returns any command failure from `Target.getTargets`.
    pub async fn targets(&self) -> Result<Vec<Target>, CdpError> {
        let result = self.raw_call("Target.getTargets", None).await?;
        let infos = result["targetInfos"]
            .as_array()
            .ok_or_else(|| CdpError::Parse("Target.getTargets missing targetInfos".into()))?;
        Ok(infos.iter().filter_map(Target::from_info).collect())
    }

    /// Resolve a target spec (index, id, or default) against the live list.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn resolve_target(&self, spec: Option<&str>) -> Result<Target, CdpError> {
        let targets = self.targets().await?;
        select_target(&targets, spec).cloned()
    }

    /// Open a new tab and return its target id.
    ///
    /// # Errors
    ///
    /// Returns any command failure from `Target.createTarget`.
    pub async fn new_tab(&self, url: &str) -> Result<String, CdpError> {
        let result = self
            .raw_call(
                "Target.createTarget",
                Some(serde_json::json!({ "url": url })),
            )
            .await?;
        result["targetId"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| CdpError::Parse("Target.createTarget missing targetId".into()))
    }

    /// Close a target. Returns whether the browser reported success.
    ///
    /// # Errors
    ///
    /// Returns any command failure from `Target.closeTarget`.
    pub async fn close_target(&self, target_id: &str) -> Result<bool, CdpError> {
        let result = self
            .raw_call(
                "Target.closeTarget",
                Some(serde_json::json!({ "targetId": target_id })),
            )
            .await?;
        Ok(result["success"].as_bool().unwrap_or(false))
    }

    /// Bring a target to the foreground.
    ///
    /// # Errors
    ///
    /// Returns any command failure from `Target.activateTarget`.
    pub async fn activate_target(&self, target_id: &str) -> Result<(), CdpError> {
        self.raw_call(
            "Target.activateTarget",
            Some(serde_json::json!({ "targetId": target_id })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, target_type: &str) -> Target {
        Target {
            id: id.to_owned(),
            target_type: target_type.to_owned(),
            title: format!("Title {id}"),
            url: format!("https://example.com/{id}"),
            attached: false,
        }
    }

    #[test]
    fn default_picks_first_page() {
        let targets = vec![
            target("bg", "background_page"),
            target("p1", "page"),
            target("p2", "page"),
        ];
        assert_eq!(select_target(&targets, None).unwrap().id, "p1");
    }

    #[test]
    fn no_page_targets_is_not_found() {
        let targets = vec![target("sw", "service_worker")];
        assert!(matches!(
            select_target(&targets, None),
            Err(CdpError::NotFound(_))
        ));
    }

    #[test]
    fn numeric_spec_indexes_the_list() {
        let targets = vec![target("a", "page"), target("b", "page")];
        assert_eq!(select_target(&targets, Some("1")).unwrap().id, "b");
    }

    #[test]
    fn index_out_of_range_is_not_found() {
        let targets = vec![target("a", "page")];
        assert!(matches!(
            select_target(&targets, Some("3")),
            Err(CdpError::NotFound(_))
        ));
    }

    #[test]
    fn id_spec_matches_exactly() {
        let targets = vec![target("AAAA", "page"), target("BBBB", "page")];
        assert_eq!(select_target(&targets, Some("BBBB")).unwrap().id, "BBBB");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let targets = vec![target("AAAA", "page")];
        assert!(matches!(
            select_target(&targets, Some("ZZZZ")),
            Err(CdpError::NotFound(_))
        ));
    }

    #[test]
    fn target_parses_from_cdp_info() {
        let info = serde_json::json!({
            "targetId": "T1",
            "type": "page",
            "title": "Example",
            "url": "https://example.com/",
            "attached": true
        });
        let t = Target::from_info(&info).unwrap();
        assert_eq!(t.id, "T1");
        assert!(t.attached);
    }

    #[test]
    fn target_without_id_is_skipped() {
        assert!(Target::from_info(&serde_json::json!({"type": "page"})).is_none());
    }
}
