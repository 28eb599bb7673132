//! Normalizing model output into plain docstring or code text.

/// Strip the wrapping models tend to add around an answer.
///
/// Takes the body of the first fenced code block when there is one, then
/// drops surrounding `"""`/`'''` quotes and whitespace.
pub fn clean_response(text: &str) -> String {
    let mut body = strip_fence(text);

    for quote in ["\"\"\"", "'''"] {
        if body.len() >= 6 && body.starts_with(quote) && body.ends_with(quote) {
            body = body[3..body.len() - 3].trim();
            break;
        }
    }

    body.to_string()
}

/// Like [`clean_response`] but for whole source files: only the code fence
/// is removed, docstring quotes are part of the code.
pub fn clean_code_response(text: &str) -> String {
    strip_fence(text).to_string()
}

fn strip_fence(text: &str) -> &str {
    let body = text.trim();
    let Some(open) = body.find("```") else {
        return body;
    };
    let after_fence = &body[open + 3..];
    // Skip the info string (`python`, `rust`, ...) on the fence line.
    let content = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence,
    };
    match content.find("```") {
        Some(close) => content[..close].trim(),
        None => content.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(clean_response("  Adds two numbers.\n"), "Adds two numbers.");
    }

    #[test]
    fn fenced_block_with_language() {
        let text = "Here you go:\n```python\ndef f():\n    pass\n```\nHope this helps.";
        assert_eq!(clean_response(text), "def f():\n    pass");
    }

    #[test]
    fn bare_fence_without_close() {
        assert_eq!(clean_response("```\nSummary line."), "Summary line.");
    }

    #[test]
    fn triple_quotes_removed() {
        assert_eq!(
            clean_response("\"\"\"Load config.\n\nArgs:\n    path: file\n\"\"\""),
            "Load config.\n\nArgs:\n    path: file"
        );
        assert_eq!(clean_response("'''Short.'''"), "Short.");
    }

    #[test]
    fn quotes_inside_fence() {
        assert_eq!(clean_response("```\n\"\"\"Doc.\"\"\"\n```"), "Doc.");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(clean_response("   "), "");
    }

    #[test]
    fn code_keeps_docstring_quotes() {
        let text = "```python\n\"\"\"Module.\"\"\"\nx = 1\n\"\"\"Trailing.\"\"\"\n```";
        assert_eq!(
            clean_code_response(text),
            "\"\"\"Module.\"\"\"\nx = 1\n\"\"\"Trailing.\"\"\""
        );
    }
}
