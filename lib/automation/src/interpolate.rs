//! Config variable interpolation.
//!
//! Node configurations may reference upstream outputs with
//! `{{node_<id>.<port>}}` placeholders. Before a node runs, the engine
//! resolves its config against the outputs recorded so far:
//!
//! - a string that is exactly one placeholder is replaced by the referenced
//!   value, preserving its JSON type
//! - placeholders embedded in longer strings are stringified in place
//! - unresolvable references are left untouched, so a config round-trips
//!   unchanged when its upstream has produced nothing

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;

use crate::node::NodeId;

/// Resolves all placeholders in `config` against recorded outputs.
#[must_use]
pub fn interpolate(
    config: &JsonValue,
    outputs: &HashMap<NodeId, HashMap<String, JsonValue>>,
) -> JsonValue {
    match config {
        JsonValue::String(s) => interpolate_string(s, outputs),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| interpolate(v, outputs)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, outputs)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_string(
    s: &str,
    outputs: &HashMap<NodeId, HashMap<String, JsonValue>>,
) -> JsonValue {
    // Whole-string placeholder keeps the referenced value's type.
    if let Some(reference) = as_sole_placeholder(s)
        && let Some(value) = lookup(reference, outputs)
    {
        return value.clone();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let reference = after[..end].trim();
                match lookup(reference, outputs) {
                    Some(value) => result.push_str(&stringify(value)),
                    None => {
                        result.push_str("{{");
                        result.push_str(&after[..end]);
                        result.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                result.push_str("{{");
                rest = after;
            }
        }
    }
    result.push_str(rest);

    JsonValue::String(result)
}

fn as_sole_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    let inner = inner.trim();
    // Reject strings containing further placeholders, e.g. "{{a}} {{b}}".
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

fn lookup<'a>(
    reference: &str,
    outputs: &'a HashMap<NodeId, HashMap<String, JsonValue>>,
) -> Option<&'a JsonValue> {
    let (node_ref, port) = reference.split_once('.')?;
    let node_id = NodeId::from_str(node_ref).ok()?;
    outputs.get(&node_id)?.get(port)
}

fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
