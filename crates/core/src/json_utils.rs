//! JSON helpers for provider responses.

/// Strip markdown code fences from model output that should be JSON.
///
/// Handles `` ```json ... ``` ``, bare `` ``` ... ``` `` and other language tags.
#[must_use]
pub fn strip_markdown_json(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        let inner = trimmed.get(3..trimmed.len() - 3).unwrap_or(trimmed);
        return inner.split_once('\n').map_or_else(|| inner.trim(), |(_, rest)| rest.trim());
    }
    trimmed
}

/// Pull an `f64` out of a JSON value, accepting numeric strings.
#[must_use]
pub fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let input = "```json\n{\"plan\": {}}\n```";
        assert_eq!(strip_markdown_json(input), "{\"plan\": {}}");
    }

    #[test]
    fn strips_plain_fence() {
        let input = "  ```\n{\"a\": 1}\n```  ";
        assert_eq!(strip_markdown_json(input), "{\"a\": 1}");
    }

    #[test]
    fn leaves_bare_json() {
        assert_eq!(strip_markdown_json(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn numeric_strings_parse() {
        assert_eq!(value_as_f64(&serde_json::json!("2.5")), Some(2.5));
        assert_eq!(value_as_f64(&serde_json::json!(4)), Some(4.0));
        assert_eq!(value_as_f64(&serde_json::json!(null)), None);
    }
}
