// Placeholder substitution for subscription templates
//
// Templates are raw text containing `{{dotted.path}}` placeholders. Each
// resolved placeholder is replaced by the JSON encoding of the value found at
// that path in the payload; the substituted text must then parse as JSON.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_$\-]+(?:\.[A-Za-z0-9_$\-]+)*)\s*\}\}")
        .expect("placeholder regex is valid")
});

/// Look up a dotted path (`a.b.0.c`) in a JSON value
///
/// Object segments are keys; array segments are decimal indices.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace every resolvable placeholder with its JSON encoding
///
/// Placeholders whose path does not resolve are left as literal text.
pub fn substitute_placeholders(template: &str, payload: &Value) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            match resolve_path(payload, path) {
                Some(value) => value.to_string(),
                None => {
                    debug!(path = path, "Template placeholder did not resolve");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// Extract the distinct placeholder paths used by a template
pub fn placeholder_paths(template: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_REGEX.captures_iter(template) {
        let path = caps[1].to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Apply a template to a payload
///
/// Falls back to the untouched payload (with a warning) when the substituted
/// text is not valid JSON.
#[instrument(skip(template, payload), fields(template_len = template.len()))]
pub fn apply_template(template: &str, payload: &Value) -> Value {
    let rendered = substitute_placeholders(template, payload);
    match serde_json::from_str::<Value>(&rendered) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Template did not produce valid JSON, sending raw payload");
            payload.clone()
        }
    }
}
