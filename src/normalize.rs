//! Input normalization ahead of chunking.
//!
//! Clips arrive as browser-captured HTML, often truncated mid-tag. They are
//! converted to markdown-flavored text with `htmd` (a browser-grade parser,
//! so malformed markup degrades instead of failing) with script and style
//! contents dropped. All source kinds then go through whitespace collapsing:
//! runs of spaces and tabs become one space, blank-line runs become a single
//! paragraph break, and edges are trimmed.

use anyhow::{Context, Result};
use htmd::HtmlToMarkdown;

/// Convert clipped HTML to normalized text.
pub fn normalize_html(html: &str) -> Result<String> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .build();
    let text = converter
        .convert(html)
        .context("Failed to convert clipped HTML")?;
    Ok(collapse_whitespace(&text))
}

/// Collapse whitespace while keeping paragraph structure.
pub fn collapse_whitespace(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_tags_are_stripped() {
        let text = normalize_html("<p>Ownership rules govern memory.</p>").unwrap();
        assert!(text.contains("Ownership rules govern memory."));
        assert!(!text.contains('<'));
    }

    #[test]
    fn script_and_style_content_dropped() {
        let html = "<style>.x{color:red}</style><p>Visible</p><script>alert(1)</script>";
        let text = normalize_html(html).unwrap();
        assert!(text.contains("Visible"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color:red"));
    }

    #[test]
    fn truncated_markup_is_tolerated() {
        let text = normalize_html("<div><p>Cut off mid senten").unwrap();
        assert!(text.contains("Cut off mid senten"));
    }

    #[test]
    fn markup_only_input_normalizes_to_empty() {
        let text = normalize_html("<div><span></span></div>").unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn space_runs_collapse_to_one() {
        assert_eq!(
            collapse_whitespace("too   many\t\tspaces  here"),
            "too many spaces here"
        );
    }

    #[test]
    fn blank_line_runs_become_one_paragraph_break() {
        let text = "first paragraph\n\n\n\n\nsecond   paragraph\n";
        assert_eq!(
            collapse_whitespace(text),
            "first paragraph\n\nsecond paragraph"
        );
    }

    #[test]
    fn single_newlines_inside_paragraphs_survive() {
        let text = "line one\nline two\n\nnext para";
        assert_eq!(collapse_whitespace(text), "line one\nline two\n\nnext para");
    }

    #[test]
    fn whitespace_only_collapses_to_empty() {
        assert_eq!(collapse_whitespace("  \n\t \n\n "), "");
    }
}
