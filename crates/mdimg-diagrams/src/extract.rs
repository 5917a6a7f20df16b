//! Mermaid block extraction.
//!
//! Scans Markdown line by line and returns every fenced `mermaid` block that
//! starts at column 0. Other fenced code blocks are skipped as a whole so a
//! mermaid fence shown inside, say, a `markdown` example is left alone.
//!
//! Fence metadata comes in two forms, both normalised to lower-case keys:
//!
//! ```text
//! ```mermaid {theme: dark, caption: "Login, step 1"}
//! ```mermaid theme=dark caption="Login flow"
//! ```
//!
//! An unterminated mermaid fence is reported as a [`ParseAnomaly`] and only
//! its opening line is skipped; scanning resumes on the next line and the
//! text is left untouched.

use std::collections::BTreeMap;

use crate::block::{DiagramBlock, Extraction, ParseAnomaly};
use crate::fence::{self, Line, OpeningFence};

/// Extract mermaid diagram blocks from Markdown text in document order.
///
/// Never fails: malformed syntax is reported through
/// [`Extraction::anomalies`].
#[must_use]
pub fn extract_blocks(markdown: &str) -> Extraction {
    let lines = fence::lines(markdown);
    let mut extraction = Extraction::default();
    let mut i = 0;

    while i < lines.len() {
        let Some(opening) = fence::opening_fence(lines[i].text) else {
            i += 1;
            continue;
        };
        let closing = lines[i + 1..]
            .iter()
            .position(|line| fence::is_closing_fence(line.text, opening.ch, opening.len))
            .map(|offset| i + 1 + offset);

        let Some(info) = diagram_info(&opening) else {
            // Unterminated non-diagram fences run to the end of the document
            i = closing.map_or(lines.len(), |j| j + 1);
            continue;
        };

        let Some(j) = closing else {
            extraction.anomalies.push(ParseAnomaly {
                line: i + 1,
                reason: "unterminated mermaid fence, block left as-is".to_owned(),
            });
            i += 1;
            continue;
        };

        let attributes = match parse_attributes(info) {
            Ok(attributes) => attributes,
            Err(reason) => {
                extraction.anomalies.push(ParseAnomaly {
                    line: i + 1,
                    reason: format!("ignoring fence attributes: {reason}"),
                });
                BTreeMap::new()
            }
        };

        extraction.blocks.push(DiagramBlock {
            source: block_source(markdown, &lines[i + 1..j], lines[j]),
            attributes,
            span: lines[i].start..lines[j].content_end(),
            index: extraction.blocks.len(),
            line: i + 1,
        });
        i = j + 1;
    }

    extraction
}

/// Attribute part of the info string, if the fence opens a diagram.
fn diagram_info<'a>(opening: &OpeningFence<'a>) -> Option<&'a str> {
    if opening.indent > 0 {
        return None;
    }
    let info = opening.info;
    let lang_end = info
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(info.len());
    info[..lang_end]
        .eq_ignore_ascii_case("mermaid")
        .then(|| info[lang_end..].trim())
}

fn block_source(markdown: &str, body: &[Line<'_>], closing: Line<'_>) -> String {
    let Some(first) = body.first() else {
        return String::new();
    };
    let raw = &markdown[first.start..closing.start];
    let raw = raw.strip_suffix('\n').unwrap_or(raw);
    raw.strip_suffix('\r').unwrap_or(raw).to_owned()
}

/// Parse fence metadata into attributes.
///
/// Accepts `{key: value, key=value}` and `key=value key="quoted value"`.
/// Bare words in the token form are flags with the value `true`.
fn parse_attributes(info: &str) -> Result<BTreeMap<String, String>, String> {
    let mut attributes = BTreeMap::new();
    if info.is_empty() {
        return Ok(attributes);
    }

    let items = if let Some(inner) = info.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| "missing closing '}'".to_owned())?;
        split_unquoted(inner, |c| c == ',')?
    } else {
        split_unquoted(info, char::is_whitespace)?
    };

    for item in items {
        let (key, value) = match item.find([':', '=']) {
            Some(pos) => (&item[..pos], unquote(item[pos + 1..].trim())),
            None => (item, "true".to_owned()),
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("attribute without a name in '{item}'"));
        }
        attributes.insert(key.to_ascii_lowercase(), value);
    }

    Ok(attributes)
}

/// Split on separators that are not inside single or double quotes.
///
/// Empty items are dropped and the rest trimmed.
fn split_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if is_sep(c) => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    if quote.is_some() {
        return Err("unbalanced quote".to_owned());
    }
    parts.push(&s[start..]);

    Ok(parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect())
}

/// Strip matching surrounding quotes and resolve backslash escapes.
fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && (value.starts_with('"') && value.ends_with('"')
            || value.starts_with('\'') && value.ends_with('\''));
    if !quoted {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len() - 2);
    let mut chars = value[1..value.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_no_blocks() {
        let extraction = extract_blocks("# Title\n\nJust text.\n\n```rust\nfn main() {}\n```\n");
        assert!(extraction.blocks.is_empty());
        assert!(extraction.anomalies.is_empty());
    }

    #[test]
    fn test_single_block() {
        let md = "Intro\n\n```mermaid\nflowchart TD; A-->B\n```\n\nOutro\n";
        let extraction = extract_blocks(md);

        assert_eq!(extraction.blocks.len(), 1);
        let block = &extraction.blocks[0];
        assert_eq!(block.source, "flowchart TD; A-->B");
        assert!(block.attributes.is_empty());
        assert_eq!(block.index, 0);
        assert_eq!(block.line, 3);
        assert_eq!(&md[block.span.clone()], "```mermaid\nflowchart TD; A-->B\n```");
    }

    #[test]
    fn test_source_is_verbatim() {
        let md = "```mermaid\n  graph LR\n\n    A --> B  \n```";
        let block = &extract_blocks(md).blocks[0];
        assert_eq!(block.source, "  graph LR\n\n    A --> B  ");
        assert_eq!(block.span, 0..md.len());
    }

    #[test]
    fn test_crlf_line_endings() {
        let md = "```mermaid\r\ngraph LR\r\nA-->B\r\n```\r\nafter\r\n";
        let block = &extract_blocks(md).blocks[0];
        assert_eq!(block.source, "graph LR\r\nA-->B");
        assert_eq!(&md[block.span.clone()], "```mermaid\r\ngraph LR\r\nA-->B\r\n```");
    }

    #[test]
    fn test_empty_block() {
        let block = &extract_blocks("```mermaid\n```\n").blocks[0];
        assert_eq!(block.source, "");
    }

    #[test]
    fn test_multiple_blocks_in_order() {
        let md = "```mermaid\nA\n```\ntext\n~~~mermaid\nB\n~~~\n```Mermaid\nC\n```\n";
        let blocks = extract_blocks(md).blocks;

        let got: Vec<_> = blocks.iter().map(|b| (b.index, b.source.as_str())).collect();
        assert_eq!(got, vec![(0, "A"), (1, "B"), (2, "C")]);
        assert!(blocks[0].span.end <= blocks[1].span.start);
        assert!(blocks[1].span.end <= blocks[2].span.start);
    }

    #[test]
    fn test_brace_attributes() {
        let md = "```mermaid {Theme: dark, caption: \"Login, step 1\", id=login}\nA\n```\n";
        let block = &extract_blocks(md).blocks[0];
        assert_eq!(
            block.attributes,
            attrs(&[("theme", "dark"), ("caption", "Login, step 1"), ("id", "login")])
        );
        assert_eq!(block.id(), Some("login"));
    }

    #[test]
    fn test_brace_without_space() {
        let block = &extract_blocks("```mermaid{theme: forest}\nA\n```").blocks[0];
        assert_eq!(block.attributes, attrs(&[("theme", "forest")]));
    }

    #[test]
    fn test_token_attributes() {
        let md = "```mermaid theme=dark caption=\"Two words\" alt='It\\'s' center\nA\n```\n";
        let block = &extract_blocks(md).blocks[0];
        assert_eq!(
            block.attributes,
            attrs(&[
                ("theme", "dark"),
                ("caption", "Two words"),
                ("alt", "It's"),
                ("center", "true"),
            ])
        );
    }

    #[test]
    fn test_malformed_attributes_keep_block() {
        let md = "```mermaid {theme: dark\nA\n```\n";
        let extraction = extract_blocks(md);

        assert_eq!(extraction.blocks.len(), 1);
        assert!(extraction.blocks[0].attributes.is_empty());
        assert_eq!(extraction.anomalies.len(), 1);
        assert_eq!(extraction.anomalies[0].line, 1);
        assert!(extraction.anomalies[0].reason.contains('}'));
    }

    #[test]
    fn test_unbalanced_quote_is_anomaly() {
        let extraction = extract_blocks("```mermaid caption=\"oops\nA\n```\n");
        assert_eq!(extraction.blocks.len(), 1);
        assert!(extraction.anomalies[0].reason.contains("quote"));
    }

    #[test]
    fn test_not_mermaid() {
        let md = "```mermaidjs\nA\n```\n```python\nB\n```\n";
        assert!(extract_blocks(md).blocks.is_empty());
    }

    #[test]
    fn test_indented_fence_ignored() {
        // List item content and indented code are not diagrams
        let md = "- item\n\n  ```mermaid\n  A\n  ```\n\n    ```mermaid\n    B\n    ```\n";
        let extraction = extract_blocks(md);
        assert!(extraction.blocks.is_empty());
        assert!(extraction.anomalies.is_empty());
    }

    #[test]
    fn test_mermaid_inside_other_fence_ignored() {
        let md = "````markdown\n```mermaid\nA\n```\n````\n\n```mermaid\nB\n```\n";
        let blocks = extract_blocks(md).blocks;

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "B");
        assert_eq!(blocks[0].index, 0);
    }

    #[test]
    fn test_closing_fence_rules() {
        // A shorter fence and a fence with trailing text do not close the block
        let md = "````mermaid\nA\n```\n```` not closing\nB\n`````\n";
        let block = &extract_blocks(md).blocks[0];
        assert_eq!(block.source, "A\n```\n```` not closing\nB");
    }

    #[test]
    fn test_unterminated_isolated_block() {
        // The broken fence is skipped; the following well-formed block is still found
        let md = "~~~mermaid\nbroken\n\n```mermaid\nA-->B\n```\n";
        let extraction = extract_blocks(md);

        assert_eq!(extraction.blocks.len(), 1);
        assert_eq!(extraction.blocks[0].source, "A-->B");
        assert_eq!(extraction.blocks[0].index, 0);
        assert_eq!(extraction.anomalies.len(), 1);
        assert_eq!(extraction.anomalies[0].line, 1);
    }

    #[test]
    fn test_unterminated_block_at_end_of_document() {
        let md = "# Page\n\n```mermaid\nflowchart TD\nA-->B\n";
        let extraction = extract_blocks(md);

        assert!(extraction.blocks.is_empty());
        assert_eq!(
            extraction.anomalies,
            vec![ParseAnomaly {
                line: 3,
                reason: "unterminated mermaid fence, block left as-is".to_owned(),
            }]
        );
    }

    #[test]
    fn test_unterminated_other_fence_hides_rest() {
        let md = "```text\nnever closed\n```mermaid\nA\n";
        let extraction = extract_blocks(md);
        assert!(extraction.blocks.is_empty());
        assert!(extraction.anomalies.is_empty());
    }

    #[test]
    fn test_split_unquoted() {
        assert_eq!(
            split_unquoted("a=1, b=\"x, y\" ,,c", |c| c == ',').unwrap(),
            vec!["a=1", "b=\"x, y\"", "c"]
        );
        assert!(split_unquoted("a='x", |c| c == ',').is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"a \\\"b\\\"\""), "a \"b\"");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\""), "\"");
    }
}
