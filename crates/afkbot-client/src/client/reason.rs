//! Plain-text extraction from chat component payloads
//!
//! Disconnect reasons and chat lines arrive as JSON chat components. Only
//! the top-level `text`, or failing that the `text` of each `extra` entry,
//! is used; anything that does not parse is returned as-is.

use serde_json::Value;

/// Extract readable text from an optional chat component payload.
pub fn extract_reason(payload: Option<&str>) -> String {
    let raw = match payload {
        Some(raw) if !raw.is_empty() => raw,
        _ => return String::new(),
    };

    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return raw.to_string(),
    };

    let Value::Object(component) = parsed else {
        return raw.to_string();
    };

    if let Some(text) = component.get("text") {
        return scalar_text(text);
    }

    if let Some(extra) = component.get("extra") {
        return join_extra(extra).unwrap_or_else(|| raw.to_string());
    }

    raw.to_string()
}

/// Render a `text` value the way a loosely typed chat library would.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

/// Concatenate the `text` of every object in `extra`.
///
/// `None` means the payload is not usable and the caller should fall back
/// to the raw text.
fn join_extra(extra: &Value) -> Option<String> {
    match extra {
        Value::Array(parts) => {
            let mut joined = String::new();
            for part in parts {
                let Value::Object(part) = part else {
                    continue;
                };
                match part.get("text") {
                    None => {}
                    Some(Value::String(s)) => joined.push_str(s),
                    Some(_) => return None,
                }
            }
            Some(joined)
        }
        // Iterating a string or an object yields no objects
        Value::String(_) | Value::Object(_) => Some(String::new()),
        _ => None,
    }
}
