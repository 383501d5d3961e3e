//! Model output cleanup
//!
//! Models wrap their answers in Markdown code fences and language tags.
//! Everything here is idempotent: cleaning already-clean text is a no-op.

const FENCE: &str = "```";

/// Body of the first fenced block, or the whole text when there is no fence
pub fn strip_code_fences(text: &str) -> &str {
    let mut parts = text.split(FENCE);
    let first = parts.next().unwrap_or_default();
    parts.next().unwrap_or(first).trim()
}

/// Drop leading `tag` words (e.g. `sql`, `json`) left over from a fence opener
pub fn strip_language_tag<'a>(text: &'a str, tag: &str) -> &'a str {
    let mut rest = text.trim();
    loop {
        match rest.get(..tag.len()) {
            Some(head) if head.eq_ignore_ascii_case(tag) => {
                let tail = &rest[tag.len()..];
                if tail.is_empty() {
                    return "";
                }
                if !tail.starts_with(char::is_whitespace) {
                    return rest;
                }
                rest = tail.trim_start();
            }
            _ => return rest,
        }
    }
}

/// Clean a generated statement for execution
pub fn normalize_sql(text: &str) -> String {
    strip_language_tag(strip_code_fences(text), "sql").to_string()
}
