use crate::error::RelayError;
use serde_json::Value;

/// Coerces the loosely typed flag fields the firmware API returns into a
/// boolean. Precedence: native booleans pass through, numbers are true when
/// non-zero, strings are matched case-insensitively against a small accept
/// list, and every other shape (null, arrays, objects, missing) is false.
pub fn normalize(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().map(|f| f != 0.0).unwrap_or(false)
            }
        }
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            matches!(s.as_str(), "true" | "1" | "yes" | "ok")
        }
        _ => false,
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Parses the raw firmware status body and renders the four-line summary.
/// Fails with a parse error when the body is not JSON; no partial output.
pub fn render_status(raw: &str) -> Result<String, RelayError> {
    let json: Value = serde_json::from_str(raw)?;

    let status = text_field(json.get("status"));
    let version = text_field(json.get("version"));
    let upgrade_available = normalize(json.get("upgrade_available").unwrap_or(&Value::Null));
    let needs_reboot = normalize(json.get("upgrade_needs_reboot").unwrap_or(&Value::Null));

    Ok(format!(
        "Status: {}\nVersion: {}\nUpgrade Available: {}\nNeeds Reboot: {}",
        status, version, upgrade_available, needs_reboot
    ))
}
