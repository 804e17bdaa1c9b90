//! Output encoding: JSON (default), NDJSON for streams, and a plain-text
//! fallback.

use std::str::FromStr;

use serde::Serialize;

use crate::error::AppError;

/// How results are rendered on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Ndjson,
    Text,
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            "text" => Ok(Self::Text),
            other => Err(AppError::general(format!(
                "unknown output format {other:?} (expected json, ndjson, or text)"
            ))),
        }
    }
}

impl OutputFormat {
    /// Parse leniently: unknown names fall back to JSON. Used for values
    /// coming from config files, which must not fail an invocation.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

/// Encode one value for the chosen format.
///
/// # Errors
///
/// Returns `AppError` when the value cannot be serialized.
pub fn encode(value: &impl Serialize, format: OutputFormat) -> Result<String, AppError> {
    let encoded = match format {
        OutputFormat::Json | OutputFormat::Ndjson => serde_json::to_string(value),
        OutputFormat::Text => {
            // Bare strings print raw; everything else pretty-prints.
            let json = serde_json::to_value(value)
                .map_err(|e| AppError::general(format!("serialization error: {e}")))?;
            if let serde_json::Value::String(s) = json {
                return Ok(s);
            }
            serde_json::to_string_pretty(&json)
        }
    };
    encoded.map_err(|e| AppError::general(format!("serialization error: {e}")))
}

/// Print one value to stdout in the chosen format.
///
/// # Errors
///
/// Returns `AppError` when the value cannot be serialized.
pub fn print(value: &impl Serialize, format: OutputFormat) -> Result<(), AppError> {
    println!("{}", encode(value, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "NDJSON".parse::<OutputFormat>().unwrap(),
            OutputFormat::Ndjson
        );
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn config_values_fall_back_to_json() {
        assert_eq!(OutputFormat::from_config("bogus"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_config("text"), OutputFormat::Text);
    }

    #[test]
    fn json_is_compact() {
        let out = encode(&json!({"a": 1, "b": [1, 2]}), OutputFormat::Json).unwrap();
        assert!(!out.contains('\n'));
    }

    #[test]
    fn text_prints_bare_strings_raw() {
        let out = encode(&"hello world", OutputFormat::Text).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn text_pretty_prints_objects() {
        let out = encode(&json!({"a": 1}), OutputFormat::Text).unwrap();
        assert!(out.contains('\n'));
    }
}
