//! Runtime property rules attached to rollouts.
use std::collections::HashMap;

use crate::context::{Attributes, EvaluationContext};

/// Returns `true` if every property listed in `definition` is present in the context's
/// `custom_properties` and equal to the expected value, comparing string forms
/// case-insensitively. An empty or absent definition always matches.
pub(crate) fn matches_runtime_definition(
    definition: Option<&HashMap<String, serde_json::Value>>,
    context: &EvaluationContext,
) -> bool {
    let Some(definition) = definition.filter(|d| !d.is_empty()) else {
        return true;
    };
    let Some(custom_properties) = context.custom_properties() else {
        return false;
    };

    definition
        .iter()
        .all(|(property, expected)| property_matches(custom_properties, property, expected))
}

fn property_matches(
    custom_properties: &Attributes,
    property: &str,
    expected: &serde_json::Value,
) -> bool {
    try_property_matches(custom_properties, property, expected).unwrap_or(false)
}

/// Returns `None` if either side has no comparable string form.
fn try_property_matches(
    custom_properties: &Attributes,
    property: &str,
    expected: &serde_json::Value,
) -> Option<bool> {
    let actual = custom_properties.get(property)?.to_scalar_string()?;
    let expected = json_scalar_string(expected)?;
    Some(actual.to_lowercase() == expected.to_lowercase())
}

fn json_scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        // Same rendering as numeric context attributes, so `3` matches `3.0`.
        serde_json::Value::Number(n) => n.as_f64().map(|n| n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}
