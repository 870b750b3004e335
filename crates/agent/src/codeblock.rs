//! Fenced code block extraction.

/// Concatenate every fenced code block in `text`, in order of appearance.
///
/// A fence is a line starting with three backticks, optionally followed by a
/// language tag. Blocks are joined with a blank line. An unterminated fence
/// is ignored. Returns `None` when no block has any content.
pub fn extract_code(text: &str) -> Option<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let is_fence = line.trim_start().starts_with("```");
        match current.take() {
            None if is_fence => current = Some(Vec::new()),
            None => {}
            Some(body) if is_fence => {
                let block = body.join("\n");
                if !block.trim().is_empty() {
                    blocks.push(block.trim_end().to_string());
                }
            }
            Some(mut body) => {
                body.push(line);
                current = Some(body);
            }
        }
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_block_with_language_tag() {
        let text = "Let me compute it.\n```python\nprint(1 + 1)\n```\n";
        assert_eq!(extract_code(text).as_deref(), Some("print(1 + 1)"));
    }

    #[test]
    fn blocks_are_concatenated_in_order() {
        let text = "```py\nx = 2\n```\nthen\n```\nprint(x * 3)\n```";
        assert_eq!(extract_code(text).as_deref(), Some("x = 2\n\nprint(x * 3)"));
    }

    #[test]
    fn plain_text_has_no_code() {
        assert_eq!(extract_code("The answer is 4."), None);
        assert_eq!(extract_code("```python\n\n```"), None);
    }

    #[test]
    fn unterminated_fence_is_ignored() {
        assert_eq!(extract_code("```python\nprint(1)"), None);
    }

    #[test]
    fn indentation_inside_block_is_preserved() {
        let text = "```python\nfor i in range(2):\n    print(i)\n```";
        assert_eq!(extract_code(text).as_deref(), Some("for i in range(2):\n    print(i)"));
    }
}
