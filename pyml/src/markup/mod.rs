//! The tag rule table: which tags exist, which attributes they accept and
//! how an empty element is closed.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::SyntaxError;
use crate::indent::IndentTracker;
use crate::line::logical_lines;

/// Rule entry used for tags that have no entry of their own.
pub const WILDCARD: &str = "*";

/// Rule entry that only carries inherited attributes.
const META: &str = ".";

const HTML_RULES: &str = include_str!("html.rules");

static HTML: Lazy<MarkupRules> = Lazy::new(|| {
    MarkupRules::parse(HTML_RULES).expect("built-in html rules are well formed")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// `<tag />` when nothing was written inside it.
    Normal,
    /// Always `<tag></tag>`.
    AlwaysSeparate,
    /// Void element: no closing tag at all.
    NeverSelfClose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagRule {
    pub close: CloseKind,
    /// `None` accepts any attribute.
    pub attributes: Option<Vec<String>>,
}

impl TagRule {
    pub fn allows(&self, attribute: &str) -> bool {
        match &self.attributes {
            None => true,
            Some(allowed) => allowed.iter().any(|a| match a.strip_suffix('*') {
                Some(prefix) => attribute.starts_with(prefix),
                None => a == attribute,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkupRules {
    tags: HashMap<String, TagRule>,
}

impl MarkupRules {
    /// A rule set that accepts every tag and attribute.
    pub fn permissive() -> Self {
        let mut tags = HashMap::new();
        tags.insert(
            WILDCARD.to_string(),
            TagRule {
                close: CloseKind::Normal,
                attributes: None,
            },
        );
        MarkupRules { tags }
    }

    /// Rule sets compiled into the binary.
    pub fn builtin(name: &str) -> Option<&'static MarkupRules> {
        match name {
            "html" => Some(&HTML),
            _ => None,
        }
    }

    /// Parse a rule file.
    ///
    /// Each line is `<tag>` with an optional `+` (always separate) or `-`
    /// (void) marker, followed by attribute names separated by spaces or
    /// commas. Nested lines inherit the attributes of the lines enclosing
    /// them; `<.>` declares attributes without declaring a tag.
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        let mut tags: HashMap<String, TagRule> = HashMap::new();
        let mut tracker = IndentTracker::new();
        let mut inherited: Vec<Vec<String>> = Vec::new();

        for line in logical_lines(source) {
            let rule_error = |message: String| SyntaxError::Rule {
                line: line.number,
                message,
            };

            let text = match line.text.find('#') {
                Some(comment) => &line.text[..comment],
                None => line.text.as_str(),
            };
            if text.trim().is_empty() {
                continue;
            }

            let level = tracker
                .find_indent(text)
                .map_err(|e| rule_error(e.to_string()))?;
            let (tag, close, attributes) = parse_rule(text.trim()).map_err(rule_error)?;

            let closes = tracker
                .handle_indent(level)
                .map_err(|e| rule_error(e.to_string()))?;
            for _ in 0..closes {
                inherited.pop();
            }
            inherited.push(attributes);

            if tag == META {
                continue;
            }

            let any = inherited.iter().flatten().any(|a| a == WILDCARD);
            let rule = tags.entry(tag).or_insert(TagRule {
                close: CloseKind::Normal,
                attributes: Some(Vec::new()),
            });
            if let Some(close) = close {
                rule.close = close;
            }
            match (&mut rule.attributes, any) {
                (attributes, true) => *attributes = None,
                (Some(list), false) => {
                    for attribute in inherited.iter().flatten() {
                        if !list.contains(attribute) {
                            list.push(attribute.clone());
                        }
                    }
                }
                (None, false) => {}
            }
        }

        log::debug!("loaded {} markup rules", tags.len());
        Ok(MarkupRules { tags })
    }

    /// The rule for `tag`, falling back to the wildcard entry.
    pub fn lookup(&self, tag: &str) -> Option<&TagRule> {
        self.tags.get(tag).or_else(|| self.tags.get(WILDCARD))
    }

    /// True only for tags with an entry of their own.
    pub fn defines(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn close_kind(&self, tag: &str) -> CloseKind {
        self.lookup(tag).map_or(CloseKind::Normal, |rule| rule.close)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

type Rule = (String, Option<CloseKind>, Vec<String>);

fn parse_rule(text: &str) -> Result<Rule, String> {
    let rest = text
        .strip_prefix('<')
        .ok_or_else(|| format!("expected '<tag>', found '{}'", text))?;
    let end = rest
        .find('>')
        .ok_or_else(|| format!("missing '>' in '{}'", text))?;
    let tag = rest[..end].trim();
    if tag.is_empty() {
        return Err("empty tag name".to_string());
    }

    let mut rest = &rest[end + 1..];
    let close = match rest.chars().next() {
        Some('+') => Some(CloseKind::AlwaysSeparate),
        Some('-') => Some(CloseKind::NeverSelfClose),
        _ => None,
    };
    if close.is_some() {
        rest = &rest[1..];
    }

    let attributes = rest
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    Ok((tag.to_string(), close, attributes))
}

/// `<tag attr ...>` and its newline.
pub fn start_tag(tag: &str, attributes: &[String]) -> String {
    if attributes.is_empty() {
        format!("<{}>\n", tag)
    } else {
        format!("<{} {}>\n", tag, attributes.join(" "))
    }
}

pub fn end_tag(tag: &str) -> String {
    format!("</{}>\n", tag)
}
