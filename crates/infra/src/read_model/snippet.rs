//! Markdown-to-plaintext snippet rendering (spec §6).
//!
//! The full Markdown-to-structured-document transform is explicitly out of
//! scope (spec §1); this is the one pure function the aggregator calls on
//! the already-stored snippet source to get a short plaintext preview.

const SNIPPET_MAX_CHARS: usize = 50;

/// Strips the common inline Markdown marks and collapses whitespace, then
/// truncates to `SNIPPET_MAX_CHARS`, appending an ellipsis if truncated.
pub fn render_snippet(source: &str) -> String {
    let mut plain = String::with_capacity(source.len());
    for ch in source.chars() {
        match ch {
            '#' | '*' | '_' | '`' | '[' | ']' | '(' | ')' => {}
            '\n' | '\r' | '\t' => plain.push(' '),
            other => plain.push(other),
        }
    }

    let collapsed: String = plain.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= SNIPPET_MAX_CHARS {
        return collapsed;
    }

    let truncated: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
    format!("{}…", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_marks_and_collapses_whitespace() {
        let rendered = render_snippet("# Hello\n\n*world*, this is   `code`.");
        assert_eq!(rendered, "Hello world, this is code.");
    }

    #[test]
    fn truncates_long_source_with_ellipsis() {
        let source = "a".repeat(80);
        let rendered = render_snippet(&source);
        assert_eq!(rendered.chars().count(), SNIPPET_MAX_CHARS + 1);
        assert!(rendered.ends_with('…'));
    }

    #[test]
    fn short_source_is_unchanged() {
        assert_eq!(render_snippet("short post"), "short post");
    }
}
