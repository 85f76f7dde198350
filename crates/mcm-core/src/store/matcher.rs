use mcm_model::EntityQuery;
use serde_json::Value;

/// `true` when every pair of `query` equals the string form of the same field in `row`.
///
/// A field absent from the row never matches.
pub(crate) fn matches(row: &Value, query: &EntityQuery) -> bool {
    query
        .pairs()
        .all(|(key, expected)| row.get(key).is_some_and(|field| field_string(field) == expected))
}

/// String form used for comparisons: strings are taken verbatim, everything else is rendered as
/// JSON (`1`, `true`, `null`).
pub(crate) fn field_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
