//! DOM interrogation. Every operation resolves the document afresh; node
//! ids are never cached across public calls.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Page, js};
use crate::cdp::CdpError;

/// Summary of one DOM node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub node_id: i64,
    pub backend_node_id: i64,
    pub node_name: String,
    pub attributes: BTreeMap<String, String>,
    pub child_count: i64,
}

impl NodeSummary {
    fn from_node(node: &serde_json::Value) -> Self {
        Self {
            node_id: node["nodeId"].as_i64().unwrap_or(0),
            backend_node_id: node["backendNodeId"].as_i64().unwrap_or(0),
            node_name: node["nodeName"].as_str().unwrap_or_default().to_lowercase(),
            attributes: attribute_pairs(node["attributes"].as_array()),
            child_count: node["childNodeCount"].as_i64().unwrap_or(0),
        }
    }
}

/// CDP delivers attributes as a flat `[name, value, name, value, ...]` list.
fn attribute_pairs(flat: Option<&Vec<serde_json::Value>>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(flat) = flat {
        for pair in flat.chunks(2) {
            if let [name, value] = pair {
                map.insert(
                    name.as_str().unwrap_or_default().to_owned(),
                    value.as_str().unwrap_or_default().to_owned(),
                );
            }
        }
    }
    map
}

impl Page {
    /// Resolve a selector to its first matching node id.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing.
    pub(crate) async fn resolve_node(&mut self, selector: &str) -> Result<i64, CdpError> {
        self.ensure_domain("DOM").await?;
        let doc = self
            .call("DOM.getDocument", Some(serde_json::json!({ "depth": 0 })))
            .await?;
        let root_id = doc["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| CdpError::Parse("DOM.getDocument missing root nodeId".into()))?;

        let found = self
            .call(
                "DOM.querySelector",
                Some(serde_json::json!({ "nodeId": root_id, "selector": selector })),
            )
            .await?;
        match found["nodeId"].as_i64() {
            Some(id) if id != 0 => Ok(id),
            _ => Err(CdpError::NotFound(format!("selector {selector:?}"))),
        }
    }

    /// Describe the first element matching a selector.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn query(&mut self, selector: &str) -> Result<NodeSummary, CdpError> {
        let node_id = self.resolve_node(selector).await?;
        let described = self
            .call(
                "DOM.describeNode",
                Some(serde_json::json!({ "nodeId": node_id })),
            )
            .await?;
        let mut summary = NodeSummary::from_node(&described["node"]);
        // describeNode reports nodeId 0 for nodes it did not pierce; keep
        // the id we resolved.
        summary.node_id = node_id;
        Ok(summary)
    }

    /// Describe every element matching a selector. An empty list is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn query_all(&mut self, selector: &str) -> Result<Vec<NodeSummary>, CdpError> {
        self.ensure_domain("DOM").await?;
        let doc = self
            .call("DOM.getDocument", Some(serde_json::json!({ "depth": 0 })))
            .await?;
        let root_id = doc["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| CdpError::Parse("DOM.getDocument missing root nodeId".into()))?;

        let found = self
            .call(
                "DOM.querySelectorAll",
                Some(serde_json::json!({ "nodeId": root_id, "selector": selector })),
            )
            .await?;
        let node_ids: Vec<i64> = found["nodeIds"]
            .as_array()
            .map(|ids| ids.iter().filter_map(serde_json::Value::as_i64).collect())
            .unwrap_or_default();

        let mut summaries = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let described = self
                .call(
                    "DOM.describeNode",
                    Some(serde_json::json!({ "nodeId": node_id })),
                )
                .await?;
            let mut summary = NodeSummary::from_node(&described["node"]);
            summary.node_id = node_id;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Outer HTML of the first match, or the whole document when no
    /// selector is given.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when a selector matches nothing.
    pub async fn html(&mut self, selector: Option<&str>) -> Result<String, CdpError> {
        self.ensure_domain("DOM").await?;
        let node_id = match selector {
            Some(selector) => self.resolve_node(selector).await?,
            None => {
                let doc = self
                    .call("DOM.getDocument", Some(serde_json::json!({ "depth": 0 })))
                    .await?;
                doc["root"]["nodeId"]
                    .as_i64()
                    .ok_or_else(|| CdpError::Parse("DOM.getDocument missing root nodeId".into()))?
            }
        };
        let result = self
            .call(
                "DOM.getOuterHTML",
                Some(serde_json::json!({ "nodeId": node_id })),
            )
            .await?;
        Ok(result["outerHTML"].as_str().unwrap_or_default().to_owned())
    }

    /// Visible text of the first match, or of the whole page body.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when a selector matches nothing.
    pub async fn text(&mut self, selector: Option<&str>) -> Result<String, CdpError> {
        match selector {
            None => {
                let value = self.eval_json(&js::body_inner_text()).await?;
                Ok(value.as_str().unwrap_or_default().to_owned())
            }
            Some(selector) => {
                let value = self.eval_json(&js::element_value(selector)).await?;
                match value {
                    serde_json::Value::Null => {
                        Err(CdpError::NotFound(format!("selector {selector:?}")))
                    }
                    value => Ok(value["value"].as_str().unwrap_or_default().to_owned()),
                }
            }
        }
    }

    /// Attribute map of the first match.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn attributes(
        &mut self,
        selector: &str,
    ) -> Result<BTreeMap<String, String>, CdpError> {
        let node_id = self.resolve_node(selector).await?;
        let result = self
            .call(
                "DOM.getAttributes",
                Some(serde_json::json!({ "nodeId": node_id })),
            )
            .await?;
        Ok(attribute_pairs(result["attributes"].as_array()))
    }

    /// Set an element's value through the native setter and fire `input`
    /// and `change`, so framework listeners observe the edit.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn set_value(&mut self, selector: &str, value: &str) -> Result<(), CdpError> {
        let result = self
            .eval_json(&js::set_value_and_fire_events(selector, value))
            .await?;
        if result.is_null() {
            return Err(CdpError::NotFound(format!("selector {selector:?}")));
        }
        Ok(())
    }

    /// Read an element's current value.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn value(&mut self, selector: &str) -> Result<String, CdpError> {
        let result = self.eval_json(&js::element_value(selector)).await?;
        match result {
            serde_json::Value::Null => Err(CdpError::NotFound(format!("selector {selector:?}"))),
            value => Ok(value["value"].as_str().unwrap_or_default().to_owned()),
        }
    }

    /// Computed style of the first match, restricted to `properties` when
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when nothing matches.
    pub async fn computed_style(
        &mut self,
        selector: &str,
        properties: &[String],
    ) -> Result<serde_json::Value, CdpError> {
        let result = self
            .eval_json(&js::computed_style(selector, properties))
            .await?;
        if result.is_null() {
            return Err(CdpError::NotFound(format!("selector {selector:?}")));
        }
        Ok(result)
    }

    /// Enumerate forms and their fields.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn forms(&mut self) -> Result<serde_json::Value, CdpError> {
        self.eval_json(&js::enumerate_forms()).await
    }

    /// Extract a table as row objects keyed by header text.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing.
    pub async fn extract_table(&mut self, selector: &str) -> Result<serde_json::Value, CdpError> {
        let result = self.eval_json(&js::extract_table(selector)).await?;
        if result.is_null() {
            return Err(CdpError::NotFound(format!("selector {selector:?}")));
        }
        Ok(result)
    }

    /// Find visible elements containing the needle text.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn find_text(
        &mut self,
        needle: &str,
        limit: usize,
    ) -> Result<serde_json::Value, CdpError> {
        self.eval_json(&js::find_text(needle, limit)).await
    }
}
