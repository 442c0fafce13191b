//! JSON recovery for noisy model output.
//!
//! Models wrap JSON in prose, code fences or stray tokens no matter how the
//! prompt is phrased. These helpers cut out the widest brace-delimited
//! substring and leave deserialization (and its own fallback) to the caller.
//! They never fail: a miss returns an empty object/array literal and logs a
//! preview of what was received.

/// Substring from the first `{` to the last `}` inclusive, or `"{}"`.
pub fn extract_object(text: &str) -> String {
    extract_delimited(text, '{', '}', "{}")
}

/// Substring from the first `[` to the last `]` inclusive, or `"[]"`.
pub fn extract_array(text: &str) -> String {
    extract_delimited(text, '[', ']', "[]")
}

fn extract_delimited(text: &str, open: char, close: char, fallback: &str) -> String {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if start < end => text[start..=end].to_string(),
        _ => {
            tracing::warn!(
                preview = %preview(text, 120),
                expected = %fallback,
                "no JSON payload found in model output"
            );
            fallback.to_string()
        }
    }
}

/// First `max_chars` characters, with an ellipsis when clipped.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max_chars).collect();
        format!("{clipped}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_recovered_from_noise() {
        assert_eq!(
            extract_object("noise {\"a\":1} trailing"),
            "{\"a\":1}"
        );
    }

    #[test]
    fn object_miss_returns_empty_literal() {
        assert_eq!(extract_object("no braces here"), "{}");
        assert_eq!(extract_object(""), "{}");
    }

    #[test]
    fn object_spans_first_open_to_last_close() {
        // Nested and repeated braces: widest span wins.
        let raw = "x {\"outer\": {\"inner\": 1}} y {\"second\": 2} z";
        assert_eq!(
            extract_object(raw),
            "{\"outer\": {\"inner\": 1}} y {\"second\": 2}"
        );
    }

    #[test]
    fn unbalanced_braces_fall_back() {
        assert_eq!(extract_object("only open {"), "{}");
        assert_eq!(extract_object("} only close"), "{}");
        // Close before open is not a span.
        assert_eq!(extract_object("} reversed {"), "{}");
    }

    #[test]
    fn array_recovered_from_code_fence() {
        let raw = "```json\n[{\"original\": \"가정통신문\"}]\n```";
        assert_eq!(extract_array(raw), "[{\"original\": \"가정통신문\"}]");
    }

    #[test]
    fn array_miss_returns_empty_literal() {
        assert_eq!(extract_array("모델이 사과문만 출력함"), "[]");
    }

    #[test]
    fn preview_clips_on_char_boundary() {
        assert_eq!(preview("짧다", 10), "짧다");
        let long = "가".repeat(50);
        let p = preview(&long, 10);
        assert_eq!(p.chars().count(), 11); // 10 chars + ellipsis
        assert!(p.ends_with('…'));
    }
}
