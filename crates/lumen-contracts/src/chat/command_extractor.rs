use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::session::OperationRequest;

fn fenced_json_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("fenced json pattern compiles")
    })
}

// Single level only: a fragment whose params object nests another `{}` never
// matches as a whole.
fn bare_operation_object() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\{[^{}]*"operation"\s*:\s*"[^"]+"\s*[^{}]*\}"#)
            .expect("operation object pattern compiles")
    })
}

/// Pulls structured filter instructions out of free-form model text.
///
/// Fenced ```json blocks are tried first; only when none of them yields a
/// request does the scan fall back to bare `{"operation": ..}` fragments.
/// Anything that does not parse is skipped.
pub fn extract(text: &str) -> Vec<OperationRequest> {
    let fenced: Vec<OperationRequest> = fenced_json_block()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| parse_request(body.as_str()))
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }

    bare_operation_object()
        .find_iter(text)
        .filter_map(|fragment| parse_request(fragment.as_str()))
        .collect()
}

fn parse_request(raw: &str) -> Option<OperationRequest> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("operation") {
        return None;
    }
    serde_json::from_value(value).ok()
}
