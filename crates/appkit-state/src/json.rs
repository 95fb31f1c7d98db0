use serde_json::Value;

/// Decode stored text as JSON, falling back to the raw text when it is not valid JSON.
pub(crate) fn try_parse(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
