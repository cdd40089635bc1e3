//! A small CSS-like selector language for page snapshots.
//!
//! # Syntax
//!
//! ```text
//! selector_list := complex ("," complex)*
//! complex       := compound (whitespace compound)*      descendant combinator only
//! compound      := tag? ("#" id | "." class | "[" attr "]")*
//! attr          := name | name ("=" | "*=" | "^=") value
//! value         := bare-word | "quoted" | 'quoted'
//! ```
//!
//! Only what the site profiles need is supported; anything else is rejected
//! with a configuration error.

use crate::domain::{AppError, Result};

use super::document::PageNode;

/// How an attribute selector compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrMatch {
    fn matches(&self, node: &PageNode) -> bool {
        let Some(actual) = node.attr(&self.name) else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Contains => actual.contains(&self.value),
            AttrOp::Prefix => actual.starts_with(&self.value),
        }
    }
}

/// One element test, e.g. `div.markdown[data-role=user]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttrMatch>,
}

impl Compound {
    fn matches(&self, node: &PageNode) -> bool {
        if node.is_text() {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !node.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| node.has_class(c))
            && self.attributes.iter().all(|a| a.matches(node))
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
    }
}

/// Compounds joined by descendant combinators; the last one is the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
}

impl Complex {
    /// `ancestors` is ordered root first.
    fn matches(&self, node: &PageNode, ancestors: &[&PageNode]) -> bool {
        let Some((subject, rest)) = self.parts.split_last() else {
            return false;
        };
        if !subject.matches(node) {
            return false;
        }

        let mut remaining = rest.iter().rev().peekable();
        for ancestor in ancestors.iter().rev() {
            match remaining.peek() {
                Some(part) if part.matches(ancestor) => {
                    remaining.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        remaining.peek().is_none()
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    /// Parses a selector list.
    ///
    /// # Errors
    /// Returns a configuration error for empty or unsupported syntax.
    pub fn parse(input: &str) -> Result<Self> {
        let mut alternatives = Vec::new();

        for raw in split_top_level(input, ',')? {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(invalid(input, "empty selector in list"));
            }

            let mut parts = Vec::new();
            for word in split_top_level(raw, ' ')? {
                if word.is_empty() {
                    continue;
                }
                parts.push(parse_compound(&word).map_err(|reason| invalid(input, &reason))?);
            }
            alternatives.push(Complex { parts });
        }

        Ok(Self {
            source: input.trim().to_string(),
            alternatives,
        })
    }

    /// Whether `node` matches, given its ancestors (root first).
    #[must_use]
    pub fn matches(&self, node: &PageNode, ancestors: &[&PageNode]) -> bool {
        self.alternatives.iter().any(|c| c.matches(node, ancestors))
    }

    /// The selector text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(selector: &str, reason: &str) -> AppError {
    AppError::Config {
        message: format!("Invalid selector '{selector}': {reason}"),
    }
}

/// Splits on `sep` outside brackets and quotes. Whitespace runs count as one
/// separator when `sep` is a space.
fn split_top_level(input: &str, sep: char) -> Result<Vec<String>> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' if depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(input, "unbalanced ']'"))?;
                current.push(ch);
            }
            c if depth == 0 && (c == sep || (sep == ' ' && c.is_whitespace())) => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(invalid(input, "unterminated attribute selector"));
    }
    pieces.push(current);
    Ok(pieces)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(input: &str) -> std::result::Result<Compound, String> {
    let mut compound = Compound::default();
    let mut chars = input.chars().peekable();

    let tag: String = std::iter::from_fn(|| chars.next_if(|c| is_name_char(*c) || *c == '*')).collect();
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag);
    }

    while let Some(ch) = chars.next() {
        match ch {
            '.' | '#' => {
                let name: String = std::iter::from_fn(|| chars.next_if(|c| is_name_char(*c))).collect();
                if name.is_empty() {
                    return Err(format!("expected a name after '{ch}'"));
                }
                if ch == '.' {
                    compound.classes.push(name);
                } else {
                    compound.id = Some(name);
                }
            }
            '[' => {
                let body: String = std::iter::from_fn(|| chars.next_if(|c| *c != ']')).collect();
                if chars.next() != Some(']') {
                    return Err("unterminated attribute selector".into());
                }
                compound.attributes.push(parse_attribute(&body)?);
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    if compound.is_empty() && !input.starts_with('*') {
        return Err("empty compound selector".into());
    }
    Ok(compound)
}

fn parse_attribute(body: &str) -> std::result::Result<AttrMatch, String> {
    let (name, op, value) = if let Some((name, value)) = body.split_once("*=") {
        (name, AttrOp::Contains, value)
    } else if let Some((name, value)) = body.split_once("^=") {
        (name, AttrOp::Prefix, value)
    } else if let Some((name, value)) = body.split_once('=') {
        (name, AttrOp::Equals, value)
    } else {
        (body, AttrOp::Exists, "")
    };

    let name = name.trim();
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(format!("invalid attribute name '{name}'"));
    }

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Ok(AttrMatch {
        name: name.to_string(),
        op,
        value: value.to_string(),
    })
}
