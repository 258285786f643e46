//! Line-shape helpers: quoting, names, argument and attribute lists.

pub mod array;

use std::str::CharIndices;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SyntaxError;

pub use array::{expand_ranges, resolve_indexing};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-.:]*$").unwrap());
static CALL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-.:]*\s*\(.*\)\s*:?$").unwrap());

/// Leading characters that expand to a full attribute: `.big` is `class="big"`.
pub const SHORTHANDS: &[(char, &str)] = &[('.', "class")];

pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text)
}

/// `$name`
pub fn is_variable(text: &str) -> bool {
    VARIABLE.is_match(text)
}

/// A bare tag or macro name, optionally followed by the block colon.
pub fn is_bare_name(text: &str) -> bool {
    TAG_NAME.is_match(text.strip_suffix(':').unwrap_or(text))
}

/// `name(...)`, optionally followed by the block colon.
pub fn is_call_shaped(text: &str) -> bool {
    CALL_SHAPE.is_match(text)
}

pub fn is_number(text: &str) -> bool {
    !text.is_empty()
        && text.chars().any(|c| c.is_ascii_digit())
        && text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && text.parse::<f64>().is_ok()
}

/// Contents of a string wrapped in matching single or double quotes.
pub fn unquote(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if (first == '"' || first == '\'') && text.len() >= 2 && text.ends_with(first) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Characters of `text` that sit outside quoted strings, with their byte
/// offsets. Quote characters themselves are not yielded.
pub struct Unquoted<'a> {
    chars: CharIndices<'a>,
    quote: Option<char>,
    escaped: bool,
}

impl Iterator for Unquoted<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, c) = self.chars.next()?;
            if let Some(quote) = self.quote {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == quote {
                    self.quote = None;
                }
                continue;
            }
            if c == '"' || c == '\'' {
                self.quote = Some(c);
                continue;
            }
            return Some((index, c));
        }
    }
}

pub fn unquoted(text: &str) -> Unquoted<'_> {
    Unquoted {
        chars: text.char_indices(),
        quote: None,
        escaped: false,
    }
}

/// Byte offset of the first occurrence of `pattern` that starts outside quotes.
pub fn find_unquoted(text: &str, pattern: &str) -> Option<usize> {
    unquoted(text)
        .map(|(index, _)| index)
        .find(|&index| text[index..].starts_with(pattern))
}

pub fn count_unquoted(text: &str, pattern: &str) -> usize {
    unquoted(text)
        .filter(|&(index, _)| text[index..].starts_with(pattern))
        .count()
}

/// True when an arithmetic operator appears outside quoted strings.
pub fn has_unquoted_operator(text: &str) -> bool {
    unquoted(text).any(|(_, c)| matches!(c, '+' | '-' | '*' | '/'))
}

/// Split a comma-separated list. Quoted strings and bracketed or
/// parenthesized groups are kept whole; empty entries are dropped.
pub fn split_arguments(list: &str) -> Result<Vec<String>, SyntaxError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, c) in unquoted(list) {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SyntaxError::UnbalancedBrackets(list.to_string()))?;
            }
            ',' if depth == 0 => {
                push_part(&mut parts, &list[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SyntaxError::UnbalancedBrackets(list.to_string()));
    }
    push_part(&mut parts, &list[start..]);
    Ok(parts)
}

fn push_part(parts: &mut Vec<String>, part: &str) {
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}

/// Split `name(args...)` into the name and the raw text between the first
/// `(` and the last `)`.
pub fn split_call(text: &str) -> Result<(&str, Option<&str>), SyntaxError> {
    let text = text.trim();
    match text.find('(') {
        Some(open) => {
            let close = text
                .rfind(')')
                .filter(|&close| close > open)
                .ok_or_else(|| SyntaxError::MissingParenthesis(text.to_string()))?;
            Ok((text[..open].trim(), Some(&text[open + 1..close])))
        }
        None => Ok((text.strip_suffix(':').unwrap_or(text).trim(), None)),
    }
}

/// Parse a tag or macro call into its name and normalized attributes.
pub fn parse_definition(text: &str) -> Result<(String, Vec<String>), SyntaxError> {
    let (name, arguments) = split_call(text)?;
    let attributes = match arguments {
        Some(list) => split_attribute_list(list)?,
        None => Vec::new(),
    };
    Ok((name.to_string(), attributes))
}

pub fn split_attribute_list(list: &str) -> Result<Vec<String>, SyntaxError> {
    Ok(split_arguments(list)?
        .iter()
        .map(|attribute| normalize_attribute(attribute))
        .collect())
}

/// Apply attribute shorthands, unquote quoted attribute names and quote
/// numeric values.
pub fn normalize_attribute(attribute: &str) -> String {
    for &(mark, name) in SHORTHANDS {
        if let Some(rest) = attribute.strip_prefix(mark) {
            if !rest.is_empty() && !is_number(attribute) {
                return format!("{}=\"{}\"", name, rest);
            }
        }
    }

    let mut attribute = attribute.to_string();
    if let Some(quote) = attribute.chars().next().filter(|c| *c == '"' || *c == '\'') {
        if let Some(end) = attribute[1..].find(quote).map(|i| i + 1) {
            let rest = attribute[end + 1..].trim_start();
            if rest.starts_with('=') {
                attribute = format!("{}{}", &attribute[1..end], rest);
            }
        }
    }

    if let Some((name, value)) = attribute.split_once('=') {
        let (name, value) = (name.trim(), value.trim());
        if is_tag_attribute_name(name) && is_number(value) {
            return format!("{}=\"{}\"", name, value);
        }
    }
    attribute
}

/// The attribute name of `name=value` or of a bare `name`.
pub fn attribute_name(attribute: &str) -> &str {
    attribute.split('=').next().unwrap_or(attribute).trim()
}

fn is_tag_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}
