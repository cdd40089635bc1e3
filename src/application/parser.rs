//! Message content parsing and text normalization.
//!
//! Turns a message subtree into plain text with light Markdown cues: fenced
//! code blocks, TeX math, list bullets, quote markers and headings survive;
//! everything else about the markup is dropped.

use crate::domain::MAX_RAW_SNIPPET_CHARS;
use crate::infrastructure::PageNode;

/// Elements whose content never belongs to a message.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "button", "svg", "canvas", "iframe",
];

/// Elements rendered as their own paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "table", "thead", "tbody", "tr",
    "figure", "details", "summary", "li",
];

/// Class names marking rendered math.
const MATH_CLASSES: &[&str] = &["katex", "katex-display", "math", "math-inline", "math-display", "MathJax"];

/// Extracts readable text from a message subtree.
#[must_use]
pub fn extract_text(node: &PageNode) -> String {
    let mut out = String::new();
    walk(node, &mut out);
    out
}

fn walk(node: &PageNode, out: &mut String) {
    if node.is_text() {
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        return;
    }

    let tag = node.tag.to_ascii_lowercase();
    if SKIPPED_TAGS.contains(&tag.as_str()) || node.attr("aria-hidden") == Some("true") {
        return;
    }

    if is_math(node, &tag) {
        out.push_str(&render_math(node));
        return;
    }

    match tag.as_str() {
        "br" => out.push('\n'),
        "hr" => {
            block_break(out);
            out.push_str("---");
            block_break(out);
        }
        "pre" => {
            block_break(out);
            out.push_str(&render_code_block(node));
            block_break(out);
        }
        "code" => {
            out.push('`');
            out.push_str(&node.text_content());
            out.push('`');
        }
        "ul" | "ol" => {
            block_break(out);
            render_list(node, tag == "ol", out);
            block_break(out);
        }
        "blockquote" => {
            block_break(out);
            let inner = normalize_whitespace(&extract_children(node));
            let quoted: Vec<String> = inner
                .lines()
                .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                .collect();
            out.push_str(&quoted.join("\n"));
            block_break(out);
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            block_break(out);
            let level = usize::from(tag.as_bytes()[1] - b'0');
            let inner = normalize_inline(&extract_children(node));
            out.push_str(&format!("{} {inner}", "#".repeat(level)));
            block_break(out);
        }
        "td" | "th" => {
            push_node_text(node, out);
            out.push(' ');
        }
        _ if BLOCK_TAGS.contains(&tag.as_str()) => {
            block_break(out);
            push_node_text(node, out);
            block_break(out);
        }
        _ => push_node_text(node, out),
    }
}

/// Own text followed by the children's rendering.
fn push_node_text(node: &PageNode, out: &mut String) {
    if let Some(text) = &node.text {
        out.push_str(text);
    }
    for child in &node.children {
        walk(child, out);
    }
}

fn extract_children(node: &PageNode) -> String {
    let mut out = String::new();
    push_node_text(node, &mut out);
    out
}

/// Ends the current paragraph unless one was just ended.
fn block_break(out: &mut String) {
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if out.ends_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}

fn render_list(node: &PageNode, ordered: bool, out: &mut String) {
    let items = node
        .children
        .iter()
        .filter(|c| c.tag.eq_ignore_ascii_case("li"));

    for (i, item) in items.enumerate() {
        let marker = if ordered {
            format!("{}. ", i + 1)
        } else {
            "- ".to_string()
        };
        let inner = normalize_whitespace(&extract_children(item));
        out.push_str(&marker);
        out.push_str(&inner.replace('\n', "\n  "));
        out.push('\n');
    }
}

fn render_code_block(pre: &PageNode) -> String {
    let code = find_tag(pre, "code");
    let language = code
        .and_then(code_language)
        .or_else(|| code_language(pre))
        .unwrap_or_default();

    let body = code.map_or_else(|| pre.text_content(), PageNode::text_content);
    format!("```{language}\n{}\n```", body.trim_end_matches('\n'))
}

/// Language annotation from `language-*` / `lang-*` classes or `data-language`.
fn code_language(node: &PageNode) -> Option<String> {
    node.classes()
        .find_map(|c| c.strip_prefix("language-").or_else(|| c.strip_prefix("lang-")))
        .or_else(|| node.attr("data-language"))
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}

fn is_math(node: &PageNode, tag: &str) -> bool {
    tag == "math" || node.classes().any(|c| MATH_CLASSES.contains(&c))
}

/// Math is kept verbatim as TeX when the page exposes the source.
fn render_math(node: &PageNode) -> String {
    let display = node.attr("display") == Some("block")
        || node.classes().any(|c| c.contains("display"));

    let tex = find_tag(node, "annotation")
        .map(PageNode::text_content)
        .or_else(|| node.attr("data-math").map(str::to_string))
        .or_else(|| node.attr("alttext").map(str::to_string));

    match tex {
        Some(tex) if display => format!("$${}$$", tex.trim()),
        Some(tex) => format!("${}$", tex.trim()),
        None => node.text_content(),
    }
}

/// First descendant element with the given tag, depth first.
fn find_tag<'a>(node: &'a PageNode, tag: &str) -> Option<&'a PageNode> {
    node.children.iter().find_map(|child| {
        if child.tag.eq_ignore_ascii_case(tag) {
            Some(child)
        } else {
            find_tag(child, tag)
        }
    })
}

/// Canonical whitespace for message content.
///
/// Horizontal whitespace runs become one space, trailing spaces are removed,
/// three or more newlines become two and the ends are trimmed. Lines inside
/// fenced code blocks are kept exactly. Applying it twice changes nothing.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    let mut in_fence = false;

    for line in text.split('\n') {
        let is_fence = line.trim_start().starts_with("```");

        if in_fence && !is_fence {
            lines.push(line.to_string());
            continue;
        }
        if is_fence {
            in_fence = !in_fence;
        }

        let collapsed = collapse_horizontal(line);
        if collapsed.is_empty() && lines.last().is_some_and(String::is_empty) {
            continue;
        }
        lines.push(collapsed);
    }

    lines.join("\n").trim().to_string()
}

fn collapse_horizontal(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;

    for ch in line.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else {
            // a leading run also becomes one space, so indentation cues survive
            if pending_space {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

/// Collapses all whitespace, including newlines, to single spaces.
#[must_use]
pub fn normalize_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Markup of `node`, cut to the raw snippet limit.
#[must_use]
pub fn raw_snippet(node: &PageNode) -> String {
    node.outer_html().chars().take(MAX_RAW_SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str) -> PageNode {
        PageNode::element(tag)
    }

    #[test]
    fn test_normalize_collapses_and_trims() {
        assert_eq!(normalize_whitespace("  a \t  b  \n\n\n\n c  "), "a b\n\n c");
        assert_eq!(normalize_whitespace("x\r\ny"), "x\ny");
        assert_eq!(normalize_whitespace(" \n \n "), "");
    }

    #[test]
    fn test_normalize_keeps_code_fences() {
        let text = "Look:\n```python\ndef f():\n    return  1\n\n\n\n```\nafter   this";
        let normalized = normalize_whitespace(text);
        assert!(normalized.contains("    return  1\n\n\n\n```"));
        assert!(normalized.ends_with("after this"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "  hello   world \n\n\n\nnext ",
            "```\n  code   here\n```\n\n\n  tail",
            "\t\tindented\n\n\n",
            "unterminated\n```rust\n  let x = 1;\n\n\n",
        ];
        for sample in samples {
            let once = normalize_whitespace(sample);
            assert_eq!(normalize_whitespace(&once), once, "sample: {sample:?}");
        }
    }

    #[test]
    fn test_normalize_inline() {
        assert_eq!(normalize_inline("  My   Chat  "), "My Chat");
        assert_eq!(normalize_inline("a\n\tb"), "a b");
    }

    #[test]
    fn test_paragraphs_and_inline_code() {
        let node = el("div")
            .with_child(el("p").with_text("Use ").with_child(el("code").with_text("cargo")))
            .with_child(el("p").with_text("Done."));
        assert_eq!(normalize_whitespace(&extract_text(&node)), "Use `cargo`\n\nDone.");
    }

    #[test]
    fn test_code_block_with_language() {
        let node = el("div").with_child(
            el("pre")
                .with_child(el("div").with_text("python Copy code"))
                .with_child(
                    el("code")
                        .with_class("hljs language-python")
                        .with_text("def f():\n    return 1\n"),
                ),
        );
        assert_eq!(
            normalize_whitespace(&extract_text(&node)),
            "```python\ndef f():\n    return 1\n```"
        );
    }

    #[test]
    fn test_lists_and_blockquotes() {
        let node = el("div")
            .with_child(
                el("ol")
                    .with_child(el("li").with_text("first"))
                    .with_child(el("li").with_child(el("p").with_text("second"))),
            )
            .with_child(el("ul").with_child(el("li").with_text("bullet")))
            .with_child(el("blockquote").with_child(el("p").with_text("quoted")));

        assert_eq!(
            normalize_whitespace(&extract_text(&node)),
            "1. first\n2. second\n\n- bullet\n\n> quoted"
        );
    }

    #[test]
    fn test_math_kept_as_tex() {
        let inline = el("span").with_class("katex").with_child(
            el("math").with_child(el("annotation").with_text("x^2 + y^2")),
        );
        let node = el("p").with_text("We have ").with_child(inline).with_text(".");
        assert_eq!(normalize_whitespace(&extract_text(&node)), "We have $x^2 + y^2$.");

        let display = el("div").with_class("katex-display").with_attr("data-math", "E=mc^2");
        assert_eq!(extract_text(&display), "$$E=mc^2$$");
    }

    #[test]
    fn test_skips_scripts_and_buttons() {
        let node = el("div")
            .with_child(el("script").with_text("alert(1)"))
            .with_child(el("button").with_text("Copy"))
            .with_child(el("span").with_text("kept"));
        assert_eq!(normalize_whitespace(&extract_text(&node)), "kept");
    }

    #[test]
    fn test_headings_keep_level() {
        let node = el("div").with_child(el("h2").with_text("Setup")).with_child(el("p").with_text("text"));
        assert_eq!(normalize_whitespace(&extract_text(&node)), "## Setup\n\ntext");
    }

    #[test]
    fn test_raw_snippet_is_bounded() {
        let node = el("p").with_text("x".repeat(2000));
        assert_eq!(raw_snippet(&node).chars().count(), MAX_RAW_SNIPPET_CHARS);
    }
}
