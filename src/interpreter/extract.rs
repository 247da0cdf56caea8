//! Pulls runnable code blocks out of raw LLM text.
//!
//! The model is only ever asked to produce plain text that may contain
//! fenced code blocks (no native function-calling); this is the boundary
//! between "what the model said" and "what the sandboxed evaluator runs".

/// One code block found in the model's output, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCode {
    pub source: String,
    pub language: Option<String>,
}

/// Extracts fenced ```code``` blocks from `text`, dropping exact-duplicate
/// blocks while keeping the first occurrence's position, and enforcing
/// `max_code_length` per block.
pub fn extract_code_blocks(text: &str, max_code_length: usize) -> crate::Result<Vec<ExtractedCode>> {
    let mut blocks = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut rest = text;

    while let Some(fence_start) = rest.find("```") {
        let after_fence = &rest[fence_start + 3..];
        let (language, body_start) = match after_fence.find('\n') {
            Some(nl) => {
                let lang_line = after_fence[..nl].trim();
                if lang_line.is_empty() {
                    (None, nl + 1)
                } else {
                    (Some(lang_line.to_string()), nl + 1)
                }
            }
            None => (None, 0),
        };
        let remainder = &after_fence[body_start..];
        let Some(close) = remainder.find("```") else {
            break;
        };
        let source = remainder[..close].trim_end_matches('\n').to_string();
        if source.len() > max_code_length {
            return Err(crate::Error::interpreter(
                format!(
                    "code block of {} characters exceeds the {max_code_length}-character limit",
                    source.len()
                ),
                0,
            ));
        }
        if seen.insert(source.clone()) {
            blocks.push(ExtractedCode { source, language });
        }
        rest = &remainder[close + 3..];
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_block() {
        let text = "Here's the plan:\n```python\nx = 1\n```\nDone.";
        let blocks = extract_code_blocks(text, 2000).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "x = 1");
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
    }

    #[test]
    fn test_extract_drops_exact_duplicates() {
        let text = "```\nx = 1\n```\nand again\n```\nx = 1\n```";
        let blocks = extract_code_blocks(text, 2000).unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_extract_enforces_max_length() {
        let text = format!("```\n{}\n```", "x = 1\n".repeat(1000));
        let err = extract_code_blocks(&text, 10).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_extract_accepts_exact_max_length_rejects_one_over() {
        let exactly_twenty = format!("```\n{}\n```", "x".repeat(20));
        let ok = extract_code_blocks(&exactly_twenty, 20).unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].source.len(), 20);

        let one_over = format!("```\n{}\n```", "x".repeat(21));
        assert!(extract_code_blocks(&one_over, 20).is_err());
    }

    #[test]
    fn test_extract_no_blocks() {
        let blocks = extract_code_blocks("just plain text, no code here", 2000).unwrap();
        assert!(blocks.is_empty());
    }
}
