//! Code fence recognition.
//!
//! Code fences in `CommonMark` use backticks or tildes (three or more) and
//! may be indented by up to three spaces. The closing fence must use the same
//! character and be at least as long as the opening fence.

/// A line of text with its byte offset in the document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// Byte offset of the first character.
    pub start: usize,
    /// Line content without `\n` or `\r\n`.
    pub text: &'a str,
}

impl Line<'_> {
    /// Byte offset just past the content, before any line terminator.
    pub(crate) fn content_end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Split `text` into lines, remembering where each one starts.
pub(crate) fn lines(text: &str) -> Vec<Line<'_>> {
    let mut start = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let content = raw.strip_suffix('\n').unwrap_or(raw);
            let content = content.strip_suffix('\r').unwrap_or(content);
            let line = Line {
                start,
                text: content,
            };
            start += raw.len();
            line
        })
        .collect()
}

/// An opening code fence.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct OpeningFence<'a> {
    /// Fence character (backtick or tilde).
    pub ch: char,
    /// Number of fence characters (minimum length for closing).
    pub len: usize,
    /// Leading spaces before the fence.
    pub indent: usize,
    /// Info string after the fence characters, trimmed.
    pub info: &'a str,
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Detect if a line opens a code fence.
pub(crate) fn opening_fence(line: &str) -> Option<OpeningFence<'_>> {
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let ch = rest.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }

    let len = rest.chars().take_while(|&c| c == ch).count();
    if len < 3 {
        return None;
    }

    let info = rest[len..].trim();
    // Backtick fences may not carry backticks in their info string
    if ch == '`' && info.contains('`') {
        return None;
    }

    Some(OpeningFence {
        ch,
        len,
        indent,
        info,
    })
}

/// Check if a line closes a fence opened with `ch` repeated `min_len` times.
///
/// The closing fence must:
/// - Be indented by at most three spaces
/// - Use the same character as opening
/// - Be at least as long as opening
/// - Contain only fence characters (optionally followed by whitespace)
pub(crate) fn is_closing_fence(line: &str, ch: char, min_len: usize) -> bool {
    let indent = leading_spaces(line);
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let count = rest.chars().take_while(|&c| c == ch).count();
    count >= min_len && rest[count..].chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_track_offsets() {
        let text = "a\r\nbb\n\nccc";
        let lines = lines(text);

        let got: Vec<_> = lines.iter().map(|l| (l.start, l.text)).collect();
        assert_eq!(got, vec![(0, "a"), (3, "bb"), (6, ""), (7, "ccc")]);
        assert_eq!(lines[1].content_end(), 5);
    }

    #[test]
    fn test_lines_empty_text() {
        assert!(lines("").is_empty());
    }

    #[test]
    fn test_backtick_fence() {
        let fence = opening_fence("```mermaid").unwrap();
        assert_eq!(fence.ch, '`');
        assert_eq!(fence.len, 3);
        assert_eq!(fence.indent, 0);
        assert_eq!(fence.info, "mermaid");
    }

    #[test]
    fn test_tilde_fence_with_attrs() {
        let fence = opening_fence("~~~~ mermaid {theme: dark} ").unwrap();
        assert_eq!(fence.ch, '~');
        assert_eq!(fence.len, 4);
        assert_eq!(fence.info, "mermaid {theme: dark}");
    }

    #[test]
    fn test_indented_fences() {
        assert_eq!(opening_fence("   ```").unwrap().indent, 3);
        assert!(opening_fence("    ```").is_none());
    }

    #[test]
    fn test_not_a_fence() {
        assert!(opening_fence("``inline``").is_none());
        assert!(opening_fence("text").is_none());
        assert!(opening_fence("").is_none());
        assert!(opening_fence("``` a`b").is_none());
    }

    #[test]
    fn test_closing_fence() {
        assert!(is_closing_fence("```", '`', 3));
        assert!(is_closing_fence("`````  ", '`', 3));
        assert!(is_closing_fence("  ```", '`', 3));
        // Wrong character, too short, trailing text, too indented
        assert!(!is_closing_fence("~~~", '`', 3));
        assert!(!is_closing_fence("```", '`', 4));
        assert!(!is_closing_fence("``` x", '`', 3));
        assert!(!is_closing_fence("    ```", '`', 3));
    }
}
