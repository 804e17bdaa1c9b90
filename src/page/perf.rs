//! Runtime performance metrics.

use std::collections::BTreeMap;

use super::Page;
use crate::cdp::CdpError;

impl Page {
    /// Collect the current `Performance.getMetrics` counters as a
    /// name-to-value map.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Parse` on an unexpected response shape, or any
    /// command failure.
    pub async fn metrics(&mut self) -> Result<BTreeMap<String, f64>, CdpError> {
        self.ensure_domain("Performance").await?;
        let result = self.call("Performance.getMetrics", None).await?;
        let metrics = result["metrics"]
            .as_array()
            .ok_or_else(|| CdpError::Parse("Performance.getMetrics missing metrics".into()))?;

        Ok(collect_metrics(metrics))
    }
}

fn collect_metrics(metrics: &[serde_json::Value]) -> BTreeMap<String, f64> {
    metrics
        .iter()
        .filter_map(|m| {
            let name = m["name"].as_str()?;
            let value = m["value"].as_f64()?;
            Some((name.to_owned(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metrics_collected_into_map() {
        let metrics = vec![
            json!({"name": "Documents", "value": 3.0}),
            json!({"name": "JSHeapUsedSize", "value": 1048576.0}),
        ];
        let map = collect_metrics(&metrics);
        assert_eq!(map["Documents"], 3.0);
        assert_eq!(map["JSHeapUsedSize"], 1_048_576.0);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let metrics = vec![
            json!({"name": "Good", "value": 1.0}),
            json!({"value": 2.0}),
            json!({"name": "NoValue"}),
        ];
        let map = collect_metrics(&metrics);
        assert_eq!(map.len(), 1);
    }
}
