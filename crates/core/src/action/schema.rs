//! Shallow JSON-Schema checks (`required`, per-property `type`) plus typed
//! argument accessors for handlers.

use serde_json::{Map, Value};

use super::ActionError;

/// Validate `args` against `schema`. `null` counts as absent: it fails a
/// required key and is accepted for an optional one. Undeclared keys pass.
pub fn validate(args: &Map<String, Value>, schema: &Value) -> Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if args.get(key).is_none_or(Value::is_null) {
                return Err(format!("missing required key {key:?}"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop_schema) in props {
            if let Some(value) = args.get(key).filter(|v| !v.is_null())
                && let Some(type_name) = prop_schema.get("type").and_then(Value::as_str)
                && !matches_json_type(value, type_name)
            {
                return Err(format!("key {key:?} must be {type_name}, got {}", preview(value, 60)));
            }
        }
    }

    Ok(())
}

fn matches_json_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

pub(crate) fn preview(value: &Value, max: usize) -> String {
    let s = value.to_string();
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

// ── Accessors ──

/// Required, non-blank string.
pub(super) fn require_str<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ActionError> {
    match args.get(key).and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ActionError::InvalidArguments(format!("{key} must be a non-empty string"))),
    }
}

/// Optional string; blank counts as absent.
pub(super) fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Optional finite number, at least `min`.
pub(super) fn optional_number(
    args: &Map<String, Value>,
    key: &str,
    min: f64,
) -> Result<Option<f64>, ActionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() && n >= min => Ok(Some(n)),
            _ => Err(ActionError::InvalidArguments(format!(
                "{key} must be a number >= {min}, got {}",
                preview(v, 40)
            ))),
        },
    }
}

pub(super) fn require_number(
    args: &Map<String, Value>,
    key: &str,
    min: f64,
) -> Result<f64, ActionError> {
    optional_number(args, key, min)?
        .ok_or_else(|| ActionError::InvalidArguments(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "count": { "type": "integer" },
                "meta": { "type": "object" }
            },
            "required": ["to"]
        })
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_valid_args_and_extra_keys() {
        assert!(validate(&obj(json!({"to": "x", "count": 2, "extra": true})), &schema()).is_ok());
    }

    #[test]
    fn rejects_missing_or_null_required() {
        assert!(validate(&obj(json!({})), &schema()).is_err());
        let err = validate(&obj(json!({"to": null})), &schema()).unwrap_err();
        assert!(err.contains("\"to\""));
    }

    #[test]
    fn null_optional_is_absent() {
        assert!(validate(&obj(json!({"to": "x", "meta": null})), &schema()).is_ok());
    }

    #[test]
    fn rejects_type_mismatch() {
        let err = validate(&obj(json!({"to": "x", "count": 1.5})), &schema()).unwrap_err();
        assert!(err.contains("integer"));
        assert!(validate(&obj(json!({"to": 3})), &schema()).is_err());
    }

    #[test]
    fn accessors_trim_and_bound() {
        let args = obj(json!({"name": "  Acme ", "blank": " ", "n": -1, "m": 4}));
        assert_eq!(require_str(&args, "name").unwrap(), "Acme");
        assert!(require_str(&args, "blank").is_err());
        assert_eq!(optional_str(&args, "blank"), None);
        assert!(optional_number(&args, "n", 0.0).is_err());
        assert_eq!(require_number(&args, "m", 0.0).unwrap(), 4.0);
        assert!(require_number(&args, "absent", 0.0).is_err());
    }
}
