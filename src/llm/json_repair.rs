//! Lenient parsing of model-produced JSON.
//!
//! Models wrap JSON in code fences, add prose around it, leave trailing
//! commas, and return numbers as strings. [`parse_lenient`] applies the
//! repair ladder in order: strip fences, locate the outermost object,
//! repair trailing commas, then parse. Numeric coercion and confidence
//! clamping are separate helpers applied field-by-field by callers.

use serde_json::Value;

/// Parse model output into a JSON object, repairing common damage.
///
/// Returns `None` only when no parsable object could be recovered.
#[must_use]
pub fn parse_lenient(raw: &str) -> Option<Value> {
    let stripped = strip_code_fences(raw);
    let candidate = extract_outermost_object(&stripped)?;

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return value.is_object().then_some(value);
    }

    let repaired = repair_trailing_commas(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Remove markdown code fences (```json ... ``` or plain ```), keeping the
/// fenced body. Input without fences passes through untouched.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut inside = false;
    for line in trimmed.lines() {
        if line.trim_start().starts_with("```") {
            inside = !inside;
            continue;
        }
        if inside {
            out.push_str(line);
            out.push('\n');
        }
    }
    if out.is_empty() {
        // Fences present but empty or unbalanced; fall back to the raw text
        // with fence lines dropped.
        trimmed
            .lines()
            .filter(|l| !l.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        out
    }
}

/// Locate the outermost `{...}` span, honouring strings and escapes.
#[must_use]
pub fn extract_outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Delete commas that directly precede a closing brace or bracket.
#[must_use]
pub fn repair_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        match ch {
            '\\' if in_string => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = !in_string;
                out.push(ch);
            }
            '}' | ']' if !in_string => {
                while out.ends_with(|c: char| c.is_whitespace()) {
                    out.pop();
                }
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Read a number field, coercing numeric strings (`"0.8"`, `"42"`).
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read a non-negative integer field with the same coercion rules.
#[must_use]
pub fn value_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| v as usize).or_else(|| {
            // Models sometimes emit integral floats (`42.0`).
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as usize)
        }),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
}

/// Clamp a confidence value to `[0, 1]`; NaN collapses to 0.
#[must_use]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_json() {
        let raw = "Here is the analysis:\n```json\n{\"confidence\": 0.8}\n```\nDone.";
        let value = parse_lenient(raw).unwrap();
        assert_eq!(value["confidence"], json!(0.8));
    }

    #[test]
    fn locates_outermost_object_in_prose() {
        let raw = "The result is {\"a\": {\"b\": 1}} as requested.";
        let value = parse_lenient(raw).unwrap();
        assert_eq!(value["a"]["b"], json!(1));
    }

    #[test]
    fn repairs_trailing_commas() {
        let raw = "{\"items\": [1, 2, 3,], \"last\": true,}";
        let value = parse_lenient(raw).unwrap();
        assert_eq!(value["items"], json!([1, 2, 3]));
        assert_eq!(value["last"], json!(true));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let raw = "{\"text\": \"a } inside\", \"n\": 2}";
        let value = parse_lenient(raw).unwrap();
        assert_eq!(value["n"], json!(2));
    }

    #[test]
    fn coerces_numeric_strings() {
        assert_eq!(value_as_f64(&json!("0.85")), Some(0.85));
        assert_eq!(value_as_f64(&json!(0.85)), Some(0.85));
        assert_eq!(value_as_usize(&json!("42")), Some(42));
        assert_eq!(value_as_usize(&json!(42.0)), Some(42));
        assert_eq!(value_as_usize(&json!(-1)), None);
    }

    #[test]
    fn clamps_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn unparsable_input_returns_none() {
        assert!(parse_lenient("no json here").is_none());
        assert!(parse_lenient("{broken").is_none());
    }
}
