//! Pulling runnable Python out of LLM output.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Decides whether text is already a syntactically valid program.
pub trait SyntaxCheck {
    fn is_valid(&self, code: &str) -> bool;
}

/// Neither a valid program nor a fenced python block was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoCodeFound {
    /// The text that was searched.
    pub text: String,
}

impl fmt::Display for NoCodeFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no python code found in {} bytes of text", self.text.len())
    }
}

impl std::error::Error for NoCodeFound {}

static PYTHON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```python\s+(.*?)\s+```").expect("python fence pattern should be valid")
});

/// Return `text` verbatim if it parses, else the last fenced python block.
///
/// Blank text is never code, even though an empty module parses.
pub fn extract_code<S: SyntaxCheck + ?Sized>(
    text: &str,
    checker: &S,
) -> Result<String, NoCodeFound> {
    if text.trim().is_empty() {
        return Err(NoCodeFound {
            text: text.to_string(),
        });
    }
    if checker.is_valid(text) {
        return Ok(text.to_string());
    }
    last_python_block(text)
        .map(str::to_string)
        .ok_or_else(|| NoCodeFound {
            text: text.to_string(),
        })
}

/// Body of the last ```` ```python ```` block, without surrounding whitespace.
pub fn last_python_block(text: &str) -> Option<&str> {
    PYTHON_FENCE_RE
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticSyntax;

    #[test]
    fn valid_code_is_accepted_verbatim() {
        let text = "x = 1\nprint(x)\n";
        let code = extract_code(text, &StaticSyntax(true)).expect("code");
        assert_eq!(code, text);
    }

    #[test]
    fn blank_text_is_not_code_even_if_it_parses() {
        for text in ["", "  \n\t"] {
            let err = extract_code(text, &StaticSyntax(true)).expect_err("blank");
            assert_eq!(err.text, text);
        }
    }

    #[test]
    fn takes_last_fenced_block() {
        let text = "First:\n```python\nprint('a')\n```\nThen:\n```python\nprint('b')\n```\nDone.";
        let code = extract_code(text, &StaticSyntax(false)).expect("code");
        assert_eq!(code, "print('b')");
    }

    #[test]
    fn ignores_untagged_fences() {
        let text = "```\nprint('a')\n```";
        let err = extract_code(text, &StaticSyntax(false)).unwrap_err();
        assert_eq!(err.text, text);
    }

    #[test]
    fn multiline_block_body_is_kept() {
        let text = "```python\nimport math\n\nprint(math.pi)\n```";
        assert_eq!(last_python_block(text), Some("import math\n\nprint(math.pi)"));
    }

    #[test]
    fn no_code_found_carries_original_text() {
        let err = extract_code("Sure! Here is the plan.", &StaticSyntax(false)).unwrap_err();
        assert_eq!(err.text, "Sure! Here is the plan.");
        assert!(err.to_string().contains("no python code found"));
    }
}
