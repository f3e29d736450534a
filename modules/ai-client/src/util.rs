/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Strip a surrounding markdown code fence from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The first `{ ... }` span in a response, for models that wrap JSON in prose.
pub fn first_json_object(response: &str) -> Option<&str> {
    let body = strip_code_blocks(response);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_chars() {
        let text = "Caf\u{e9} Data Center";
        let truncated = truncate_to_char_boundary(text, 4);
        assert_eq!(truncated, "Caf");
        assert_eq!(truncate_to_char_boundary("Taylor", 100), "Taylor");
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {} "), "{}");
    }

    #[test]
    fn finds_object_in_prose() {
        let raw = "Sure, here it is: {\"lat\": 30.5, \"lng\": -97.4} hope that helps";
        assert_eq!(first_json_object(raw), Some("{\"lat\": 30.5, \"lng\": -97.4}"));
        assert_eq!(first_json_object("UNKNOWN"), None);
    }
}
