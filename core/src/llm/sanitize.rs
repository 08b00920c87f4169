//! Deterministic post-processing of raw LLM output. Thinking models emit reasoning
//! blocks and sometimes wrap JSON answers in markdown code fences; both must be removed
//! before the remainder is parsed.

/// Removes every `<think>...</think>` pair. An unclosed `<think>` is stripped from its
/// opening tag through end-of-string. Idempotent.
pub fn strip_think_blocks(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match rest.find("<think>") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + "<think>".len()..];
                match after_open.find("</think>") {
                    Some(end) => {
                        rest = &after_open[end + "</think>".len()..];
                    }
                    None => {
                        // Unclosed block: drop through to end-of-string.
                        break;
                    }
                }
            }
        }
    }
    out
}

/// Applies [`strip_think_blocks`] then removes a single leading/trailing triple-backtick
/// fence line, if present.
pub fn strip_fences(input: &str) -> String {
    let stripped = strip_think_blocks(input);
    let trimmed = stripped.trim();

    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    lines.remove(0); // opening fence, optionally with a language tag
    if let Some(last) = lines.last() {
        if last.trim() == "```" {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}
