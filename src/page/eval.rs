//! JavaScript evaluation in the page's top-level execution context.

use serde_json::Value;

use super::Page;
use crate::cdp::CdpError;

/// The result of evaluating an expression: a tagged value rather than a
/// bare JSON blob, with a distinct case for remote objects that cannot be
/// serialised by value.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(serde_json::Map<String, Value>),
    /// A non-serialisable remote object (DOM node, function, promise,
    /// `NaN`, ...). Carries the remote object id when the browser issued
    /// one, plus its description.
    Handle {
        object_id: Option<String>,
        description: String,
    },
}

impl EvalValue {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Handle { .. } => "handle",
        }
    }

    /// Render as the `{type, value}` shape the CLI prints.
    #[must_use]
    pub fn to_output(&self) -> Value {
        let value = match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::from(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(Value::Null, Value::Number),
            Self::String(s) => Value::from(s.clone()),
            Self::Array(items) => Value::Array(items.clone()),
            Self::Object(map) => Value::Object(map.clone()),
            Self::Handle { description, .. } => Value::from(description.clone()),
        };
        serde_json::json!({ "type": self.type_name(), "value": value })
    }

    /// Build from a CDP `RemoteObject` returned with `returnByValue: true`.
    #[must_use]
    pub fn from_remote_object(object: &Value) -> Self {
        if let Some(unserializable) = object["unserializableValue"].as_str() {
            return Self::Handle {
                object_id: None,
                description: unserializable.to_owned(),
            };
        }

        match object["type"].as_str().unwrap_or("undefined") {
            "undefined" => Self::Null,
            "boolean" => Self::Bool(object["value"].as_bool().unwrap_or(false)),
            "number" => Self::Number(object["value"].as_f64().unwrap_or(0.0)),
            "string" => Self::String(object["value"].as_str().unwrap_or_default().to_owned()),
            _ => match &object["value"] {
                Value::Null => {
                    if object["subtype"].as_str() == Some("null") {
                        Self::Null
                    } else {
                        // No by-value representation came back.
                        Self::Handle {
                            object_id: object["objectId"].as_str().map(str::to_owned),
                            description: object["description"]
                                .as_str()
                                .unwrap_or("[object]")
                                .to_owned(),
                        }
                    }
                }
                Value::Array(items) => Self::Array(items.clone()),
                Value::Object(map) => Self::Object(map.clone()),
                Value::Bool(b) => Self::Bool(*b),
                Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
                Value::String(s) => Self::String(s.clone()),
            },
        }
    }
}

impl Page {
    /// Evaluate an expression in the top-level execution context and return
    /// its value. Promises are awaited.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` when the expression throws, or
    /// any command failure from `Runtime.evaluate`.
    pub async fn eval(&mut self, expression: &str) -> Result<EvalValue, CdpError> {
        let result = self.eval_response(expression).await?;
        Ok(EvalValue::from_remote_object(&result["result"]))
    }

    /// Evaluate an injected snippet and return the raw by-value result
    /// (`Value::Null` for `undefined` or a snippet's not-found `null`).
    ///
    /// # Errors
    ///
    /// As [`eval`](Self::eval).
    pub(crate) async fn eval_json(&mut self, expression: &str) -> Result<Value, CdpError> {
        let result = self.eval_response(expression).await?;
        let object = &result["result"];
        if object["type"].as_str() == Some("undefined") {
            return Ok(Value::Null);
        }
        Ok(object.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn eval_response(&mut self, expression: &str) -> Result<Value, CdpError> {
        self.ensure_domain("Runtime").await?;
        let result = self
            .call(
                "Runtime.evaluate",
                Some(serde_json::json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let description = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown JavaScript error");
            return Err(CdpError::InvalidArgument(format!(
                "expression threw: {description}"
            )));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn undefined_maps_to_null() {
        let v = EvalValue::from_remote_object(&json!({"type": "undefined"}));
        assert_eq!(v, EvalValue::Null);
        assert_eq!(v.type_name(), "null");
    }

    #[test]
    fn js_null_maps_to_null() {
        let v = EvalValue::from_remote_object(
            &json!({"type": "object", "subtype": "null", "value": null}),
        );
        assert_eq!(v, EvalValue::Null);
    }

    #[test]
    fn primitives_map_to_tagged_cases() {
        assert_eq!(
            EvalValue::from_remote_object(&json!({"type": "boolean", "value": true})),
            EvalValue::Bool(true)
        );
        assert_eq!(
            EvalValue::from_remote_object(&json!({"type": "number", "value": 42})),
            EvalValue::Number(42.0)
        );
        assert_eq!(
            EvalValue::from_remote_object(&json!({"type": "string", "value": "hi"})),
            EvalValue::String("hi".into())
        );
    }

    #[test]
    fn arrays_and_objects_keep_structure() {
        let arr = EvalValue::from_remote_object(&json!({"type": "object", "value": [1, 2, 3]}));
        assert_eq!(arr.type_name(), "array");

        let obj =
            EvalValue::from_remote_object(&json!({"type": "object", "value": {"a": 1}}));
        let EvalValue::Object(map) = obj else {
            panic!("expected object");
        };
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn promise_without_value_becomes_handle() {
        let v = EvalValue::from_remote_object(&json!({
            "type": "object",
            "subtype": "promise",
            "objectId": "obj-7",
            "description": "Promise",
        }));
        let EvalValue::Handle {
            object_id,
            description,
        } = v
        else {
            panic!("expected handle");
        };
        assert_eq!(object_id.as_deref(), Some("obj-7"));
        assert_eq!(description, "Promise");
    }

    #[test]
    fn unserializable_number_becomes_handle() {
        let v = EvalValue::from_remote_object(&json!({
            "type": "number",
            "unserializableValue": "NaN",
            "description": "NaN",
        }));
        assert!(matches!(v, EvalValue::Handle { object_id: None, ref description } if description == "NaN"));
    }

    #[test]
    fn output_shape_has_type_and_value() {
        let out = EvalValue::Number(7.0).to_output();
        assert_eq!(out["type"], "number");
        assert_eq!(out["value"], 7.0);

        let out = EvalValue::Handle {
            object_id: Some("o".into()),
            description: "Window".into(),
        }
        .to_output();
        assert_eq!(out["type"], "handle");
        assert_eq!(out["value"], "Window");
    }
}
