//! Page capture: screenshots and PDF export.

use std::fmt;
use std::str::FromStr;

use base64::Engine;

use super::Page;
use crate::cdp::CdpError;

/// Screenshot encodings supported by `Page.captureScreenshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = CdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(CdpError::InvalidArgument(format!(
                "unknown image format {other:?} (expected png, jpeg, or webp)"
            ))),
        }
    }
}

/// Bounds of a captured element, in CSS pixels.
#[derive(Debug, Clone, Copy)]
pub struct ElementBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Page {
    /// Capture the viewport (or the full scrollable page) and return the
    /// decoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Parse` when the response payload is not valid
    /// base64, or any command failure.
    pub async fn screenshot(
        &mut self,
        format: ImageFormat,
        quality: Option<u8>,
        full_page: bool,
    ) -> Result<Vec<u8>, CdpError> {
        let mut params = serde_json::json!({
            "format": format.as_str(),
            "captureBeyondViewport": full_page,
        });
        if format != ImageFormat::Png {
            params["quality"] = serde_json::json!(quality.unwrap_or(80));
        }

        let result = self.call("Page.captureScreenshot", Some(params)).await?;
        decode_payload(&result, "data")
    }

    /// Capture one element, clipped to its border box. Returns the bytes
    /// and the bounds used for the clip.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing or
    /// the element has no box.
    pub async fn screenshot_element(
        &mut self,
        selector: &str,
        format: ImageFormat,
        quality: Option<u8>,
    ) -> Result<(Vec<u8>, ElementBounds), CdpError> {
        let node_id = self.resolve_node(selector).await?;
        self.call(
            "DOM.scrollIntoViewIfNeeded",
            Some(serde_json::json!({ "nodeId": node_id })),
        )
        .await?;

        let result = self
            .call(
                "DOM.getBoxModel",
                Some(serde_json::json!({ "nodeId": node_id })),
            )
            .await?;
        let bounds = bounds_from_quad(result["model"]["border"].as_array()).ok_or_else(|| {
            CdpError::NotFound(format!("element {selector:?} has no box (hidden?)"))
        })?;

        let mut params = serde_json::json!({
            "format": format.as_str(),
            "clip": {
                "x": bounds.x,
                "y": bounds.y,
                "width": bounds.width,
                "height": bounds.height,
                "scale": 1,
            },
            "captureBeyondViewport": true,
        });
        if format != ImageFormat::Png {
            params["quality"] = serde_json::json!(quality.unwrap_or(80));
        }

        let result = self.call("Page.captureScreenshot", Some(params)).await?;
        Ok((decode_payload(&result, "data")?, bounds))
    }

    /// Render the page to PDF and return the bytes.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Parse` on a bad payload, or any command failure.
    pub async fn print_to_pdf(&mut self, landscape: bool) -> Result<Vec<u8>, CdpError> {
        let result = self
            .call(
                "Page.printToPDF",
                Some(serde_json::json!({
                    "landscape": landscape,
                    "printBackground": true,
                })),
            )
            .await?;
        decode_payload(&result, "data")
    }
}

fn bounds_from_quad(quad: Option<&Vec<serde_json::Value>>) -> Option<ElementBounds> {
    let quad = quad.filter(|q| q.len() == 8)?;
    let values: Vec<f64> = quad.iter().filter_map(serde_json::Value::as_f64).collect();
    if values.len() != 8 {
        return None;
    }
    let xs = [values[0], values[2], values[4], values[6]];
    let ys = [values[1], values[3], values[5], values[7]];
    let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(ElementBounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

fn decode_payload(result: &serde_json::Value, field: &str) -> Result<Vec<u8>, CdpError> {
    let data = result[field]
        .as_str()
        .ok_or_else(|| CdpError::Parse(format!("capture response missing {field:?}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CdpError::Parse(format!("capture payload is not valid base64: {e}")))
}
