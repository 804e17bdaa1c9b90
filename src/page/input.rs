//! Input synthesis: mouse, keyboard, and scrolling.

use serde::Serialize;

use super::{Page, js};
use crate::cdp::CdpError;

/// CDP modifier bits.
const MOD_ALT: u8 = 1;
const MOD_CTRL: u8 = 2;
const MOD_META: u8 = 4;
const MOD_SHIFT: u8 = 8;

/// Outcome of a click, with the viewport point that was hit.
#[derive(Debug, Clone, Serialize)]
pub struct ClickResult {
    pub clicked: bool,
    pub x: f64,
    pub y: f64,
}

impl Page {
    /// Click the centre of the first element matching a selector: scroll it
    /// into view, resolve its box model, then dispatch `mousePressed` and
    /// `mouseReleased` at the content centre.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing or
    /// the element has no box (hidden), or any command failure.
    pub async fn click(&mut self, selector: &str) -> Result<ClickResult, CdpError> {
        let (x, y) = self.element_center(selector).await?;
        self.dispatch_click(x, y).await?;
        Ok(ClickResult { clicked: true, x, y })
    }

    /// Click at a viewport coordinate.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for negative coordinates.
    pub async fn click_at(&mut self, x: f64, y: f64) -> Result<ClickResult, CdpError> {
        if x < 0.0 || y < 0.0 || !x.is_finite() || !y.is_finite() {
            return Err(CdpError::InvalidArgument(format!(
                "click coordinates must be non-negative, got ({x}, {y})"
            )));
        }
        self.dispatch_click(x, y).await?;
        Ok(ClickResult { clicked: true, x, y })
    }

    /// Move the pointer to an element's centre without pressing.
    ///
    /// # Errors
    ///
    /// As [`click`](Self::click).
    pub async fn hover(&mut self, selector: &str) -> Result<(f64, f64), CdpError> {
        let (x, y) = self.element_center(selector).await?;
        self.call(
            "Input.dispatchMouseEvent",
            Some(serde_json::json!({
                "type": "mouseMoved",
                "x": x,
                "y": y,
            })),
        )
        .await?;
        Ok((x, y))
    }

    /// Replace an element's value the way a user would: focus it, select
    /// the existing text, insert the replacement, then fire `input` and
    /// `change`.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing.
    pub async fn fill(&mut self, selector: &str, text: &str) -> Result<(), CdpError> {
        let node_id = self.resolve_node(selector).await?;
        self.call("DOM.focus", Some(serde_json::json!({ "nodeId": node_id })))
            .await?;

        // Select any existing value so insertText replaces rather than
        // appends; non-text elements simply have nothing to select.
        self.eval_json(
            "(function() { var el = document.activeElement; if (el && el.select) el.select(); return true; })()",
        )
        .await?;

        self.call(
            "Input.insertText",
            Some(serde_json::json!({ "text": text })),
        )
        .await?;

        // insertText does not fire change; go through the synthetic-event
        // path so listeners observe the final value.
        self.eval_json(&js::set_value_and_fire_events(selector, text))
            .await?;
        Ok(())
    }

    /// Type text as individual key events. C-style escapes `\n`, `\t`, and
    /// `\\` map to Enter, Tab, and a literal backslash.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn type_text(&mut self, text: &str) -> Result<usize, CdpError> {
        let unescaped = unescape(text);
        let mut count = 0;
        for ch in unescaped.chars() {
            match ch {
                '\n' => self.key_pair("Enter", 0).await?,
                '\t' => self.key_pair("Tab", 0).await?,
                _ => {
                    self.call(
                        "Input.dispatchKeyEvent",
                        Some(serde_json::json!({
                            "type": "char",
                            "text": ch.to_string(),
                        })),
                    )
                    .await?;
                }
            }
            count += 1;
        }
        Ok(count)
    }

    /// Press a key combination like `Enter`, `Ctrl+A`, or `Ctrl+Shift+Tab`:
    /// one `keyDown`/`keyUp` pair with the full modifier mask set on both
    /// events.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` for unknown key names or
    /// repeated modifiers.
    pub async fn press(&mut self, combination: &str) -> Result<(), CdpError> {
        let parsed = parse_key_combination(combination)?;
        self.key_pair(&parsed.key, parsed.modifiers).await
    }

    /// Scroll an element into view.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::NotFound` when the selector matches nothing.
    pub async fn scroll_to(&mut self, selector: &str) -> Result<(), CdpError> {
        let node_id = self.resolve_node(selector).await?;
        self.call(
            "DOM.scrollIntoViewIfNeeded",
            Some(serde_json::json!({ "nodeId": node_id })),
        )
        .await?;
        Ok(())
    }

    /// Scroll the page by a pixel delta. Returns the resulting scroll
    /// position.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn scroll_by(&mut self, dx: f64, dy: f64) -> Result<(f64, f64), CdpError> {
        let result = self
            .eval_json(&format!(
                "(function() {{ window.scrollBy({dx}, {dy}); \
                 return {{ x: window.scrollX, y: window.scrollY }}; }})()"
            ))
            .await?;
        Ok((
            result["x"].as_f64().unwrap_or(0.0),
            result["y"].as_f64().unwrap_or(0.0),
        ))
    }

    /// Centre of an element's content box, after scrolling it into view.
    pub(crate) async fn element_center(&mut self, selector: &str) -> Result<(f64, f64), CdpError> {
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
        let quad = result["model"]["content"]
            .as_array()
            .filter(|q| q.len() == 8)
            .ok_or_else(|| {
                CdpError::NotFound(format!("element {selector:?} has no box (hidden?)"))
            })?;

        let xs: Vec<f64> = quad.iter().step_by(2).filter_map(|v| v.as_f64()).collect();
        let ys: Vec<f64> = quad
            .iter()
            .skip(1)
            .step_by(2)
            .filter_map(|v| v.as_f64())
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let center = (
            xs.iter().sum::<f64>() / xs.len() as f64,
            ys.iter().sum::<f64>() / ys.len() as f64,
        );
        Ok(center)
    }

    async fn dispatch_click(&mut self, x: f64, y: f64) -> Result<(), CdpError> {
        for event_type in ["mousePressed", "mouseReleased"] {
            self.call(
                "Input.dispatchMouseEvent",
                Some(serde_json::json!({
                    "type": event_type,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": 1,
                })),
            )
            .await?;
        }
        Ok(())
    }

    async fn key_pair(&mut self, key: &str, modifiers: u8) -> Result<(), CdpError> {
        let key_value = cdp_key_value(key);
        let code = cdp_key_code(key);
        for event_type in ["keyDown", "keyUp"] {
            let mut params = serde_json::json!({
                "type": event_type,
                "key": key_value,
                "code": code,
                "modifiers": modifiers,
            });
            // Printable keys carry text on keyDown so the page sees input.
            if event_type == "keyDown"
                && key_value.chars().count() == 1
                && (modifiers & !MOD_SHIFT) == 0
            {
                params["text"] = serde_json::json!(key_value);
            }
            self.call("Input.dispatchKeyEvent", Some(params)).await?;
        }
        Ok(())
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// A parsed key combination.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedKey {
    /// CDP modifier mask: Alt=1, Ctrl=2, Meta=4, Shift=8.
    pub modifiers: u8,
    /// The primary (non-modifier) key name.
    pub key: String,
}

const NAMED_KEYS: &[&str] = &[
    "Enter",
    "Tab",
    "Escape",
    "Backspace",
    "Delete",
    "Insert",
    "Space",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "Home",
    "End",
    "PageUp",
    "PageDown",
    "CapsLock",
    "ContextMenu",
];

fn modifier_bit(part: &str) -> Option<u8> {
    match part {
        "Ctrl" | "Control" => Some(MOD_CTRL),
        "Alt" | "Option" => Some(MOD_ALT),
        "Meta" | "Cmd" | "Command" | "Super" => Some(MOD_META),
        "Shift" => Some(MOD_SHIFT),
        _ => None,
    }
}

fn is_known_key(part: &str) -> bool {
    if NAMED_KEYS.contains(&part) {
        return true;
    }
    // Single printable characters and digits.
    let mut chars = part.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if !c.is_whitespace() {
            return true;
        }
    }
    // Function keys F1..F24.
    if let Some(n) = part.strip_prefix('F') {
        if let Ok(n) = n.parse::<u8>() {
            return (1..=24).contains(&n);
        }
    }
    false
}

/// Parse `Ctrl+Shift+A`-style strings into a modifier mask plus primary
/// key.
///
/// # Errors
///
/// Returns `CdpError::InvalidArgument` for unknown key names, repeated
/// modifiers, or a combination with no primary key.
pub fn parse_key_combination(input: &str) -> Result<ParsedKey, CdpError> {
    let mut modifiers: u8 = 0;
    let mut primary: Option<&str> = None;

    for part in input.split('+') {
        if let Some(bit) = modifier_bit(part) {
            if modifiers & bit != 0 {
                return Err(CdpError::InvalidArgument(format!(
                    "duplicate modifier {part:?} in {input:?}"
                )));
            }
            modifiers |= bit;
        } else if is_known_key(part) {
            if primary.is_some() {
                return Err(CdpError::InvalidArgument(format!(
                    "more than one primary key in {input:?}"
                )));
            }
            primary = Some(part);
        } else {
            return Err(CdpError::InvalidArgument(format!("unknown key {part:?}")));
        }
    }

    let key = primary
        .ok_or_else(|| CdpError::InvalidArgument(format!("no primary key in {input:?}")))?;
    Ok(ParsedKey {
        modifiers,
        key: key.to_owned(),
    })
}

/// CDP `key` value for a key name.
fn cdp_key_value(key: &str) -> &str {
    match key {
        "Enter" => "\r",
        "Tab" => "\t",
        "Space" => " ",
        _ => key,
    }
}

/// CDP `code` value for a key name.
fn cdp_key_code(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => format!("Key{}", c.to_ascii_uppercase()),
        (Some(c), None) if c.is_ascii_digit() => format!("Digit{c}"),
        _ => key.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- escapes ---

    #[test]
    fn unescape_handles_c_escapes() {
        assert_eq!(unescape(r"a\nb\tc\\d"), "a\nb\tc\\d");
    }

    #[test]
    fn unescape_leaves_unknown_escapes() {
        assert_eq!(unescape(r"a\xb"), r"a\xb");
    }

    #[test]
    fn unescape_trailing_backslash() {
        assert_eq!(unescape("a\\"), "a\\");
    }

    // --- key parsing ---

    #[test]
    fn plain_key() {
        let parsed = parse_key_combination("Enter").unwrap();
        assert_eq!(parsed.modifiers, 0);
        assert_eq!(parsed.key, "Enter");
    }

    #[test]
    fn ctrl_combination() {
        let parsed = parse_key_combination("Ctrl+A").unwrap();
        assert_eq!(parsed.modifiers, MOD_CTRL);
        assert_eq!(parsed.key, "A");
    }

    #[test]
    fn ctrl_shift_combination_sets_both_bits() {
        let parsed = parse_key_combination("Ctrl+Shift+A").unwrap();
        assert_eq!(parsed.modifiers, MOD_CTRL | MOD_SHIFT);
        assert_eq!(parsed.key, "A");
    }

    #[test]
    fn modifier_aliases() {
        assert_eq!(
            parse_key_combination("Control+X").unwrap().modifiers,
            parse_key_combination("Ctrl+X").unwrap().modifiers,
        );
        assert_eq!(
            parse_key_combination("Cmd+X").unwrap().modifiers,
            MOD_META
        );
        assert_eq!(
            parse_key_combination("Option+X").unwrap().modifiers,
            MOD_ALT
        );
    }

    #[test]
    fn function_keys_accepted() {
        assert!(parse_key_combination("F5").is_ok());
        assert!(parse_key_combination("F24").is_ok());
        assert!(parse_key_combination("F25").is_err());
    }

    #[test]
    fn duplicate_modifier_rejected() {
        assert!(matches!(
            parse_key_combination("Ctrl+Ctrl+A"),
            Err(CdpError::InvalidArgument(_))
        ));
        // Aliases count as the same modifier.
        assert!(parse_key_combination("Ctrl+Control+A").is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(matches!(
            parse_key_combination("Ctrl+Banana"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn modifiers_only_rejected() {
        assert!(matches!(
            parse_key_combination("Ctrl+Shift"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    // --- CDP key mapping ---

    #[test]
    fn key_values() {
        assert_eq!(cdp_key_value("Enter"), "\r");
        assert_eq!(cdp_key_value("Tab"), "\t");
        assert_eq!(cdp_key_value("Space"), " ");
        assert_eq!(cdp_key_value("a"), "a");
        assert_eq!(cdp_key_value("ArrowUp"), "ArrowUp");
    }

    #[test]
    fn key_codes() {
        assert_eq!(cdp_key_code("a"), "KeyA");
        assert_eq!(cdp_key_code("A"), "KeyA");
        assert_eq!(cdp_key_code("7"), "Digit7");
        assert_eq!(cdp_key_code("Enter"), "Enter");
        assert_eq!(cdp_key_code("F5"), "F5");
    }

    #[test]
    fn click_result_serialization() {
        let result = ClickResult {
            clicked: true,
            x: 10.5,
            y: 20.0,
        };
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["clicked"], true);
        assert_eq!(json["x"], 10.5);
    }
}
