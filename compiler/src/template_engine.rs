//! Template engines: named rule sets that render the begin/end directives of
//! an external templating syntax, e.g. `{% if x %}` ... `{% endif %}`.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use pyml::syntax::{split_arguments, unquote, unquoted};

use crate::error::CompileError;

static ENGINE_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*TemplateEngine\s*\((.*)\)\s*$").unwrap()
});
static CREATE_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\s*=\s*create\s*\((.*)\)\s*$")
        .unwrap()
});
static APPEND_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\.append\s*\((.*)\)\s*$",
    )
    .unwrap()
});
/// Anything that looks like it wants to be one of the declarations above.
static DECLARATION_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*\s*=\s*(TemplateEngine|create|[A-Za-z0-9_.]+\.append)\s*\(")
        .unwrap()
});
static CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());

const HOLE: &str = "%s";

// ---- Formats ----

/// A format string with `%s` holes; `%%` is a literal percent sign.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pieces: Vec<String>,
}

impl Format {
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let mut pieces = vec![String::new()];
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                if let Some(piece) = pieces.last_mut() {
                    piece.push(c);
                }
                continue;
            }
            match chars.next() {
                Some('s') => pieces.push(String::new()),
                Some('%') => {
                    if let Some(piece) = pieces.last_mut() {
                        piece.push('%');
                    }
                }
                other => {
                    return Err(CompileError::TemplateEngine(format!(
                        "unsupported format sequence '%{}' in \"{}\"",
                        other.map(String::from).unwrap_or_default(),
                        text
                    )));
                }
            }
        }
        Ok(Format { pieces })
    }

    pub fn holes(&self) -> usize {
        self.pieces.len() - 1
    }

    /// Fill the holes in order. The caller checks the count.
    pub fn render<S: AsRef<str>>(&self, arguments: &[S]) -> String {
        let mut text = String::new();
        for (index, piece) in self.pieces.iter().enumerate() {
            if index > 0 {
                if let Some(argument) = arguments.get(index - 1) {
                    text.push_str(argument.as_ref());
                }
            }
            text.push_str(piece);
        }
        text
    }
}

// ---- Engines ----

#[derive(Debug, Clone)]
pub struct EngineMethod {
    pub start: Format,
    pub end: Option<Format>,
    pub submethods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    pub name: String,
    tag: Format,
    methods: HashMap<String, EngineMethod>,
    /// Open calls as (method, indent level), innermost last.
    open_calls: Vec<(String, usize)>,
}

impl TemplateEngine {
    pub fn new(name: impl Into<String>, tag_format: &str) -> Result<Self, CompileError> {
        let tag = Format::parse(tag_format)?;
        if tag.holes() != 1 {
            return Err(CompileError::TemplateEngine(format!(
                "tag format \"{}\" must contain exactly one {}",
                tag_format, HOLE
            )));
        }
        Ok(TemplateEngine {
            name: name.into(),
            tag,
            methods: HashMap::new(),
            open_calls: Vec::new(),
        })
    }

    pub fn add_method(
        &mut self,
        name: &str,
        start: &str,
        end: Option<&str>,
    ) -> Result<(), CompileError> {
        let end = end.map(Format::parse).transpose()?;
        if let Some(end) = &end {
            if end.holes() != 0 {
                return Err(CompileError::TemplateEngine(format!(
                    "end format of {}.{} cannot take variables",
                    self.name, name
                )));
            }
        }
        self.methods.insert(
            name.to_string(),
            EngineMethod {
                start: Format::parse(start)?,
                end,
                submethods: Vec::new(),
            },
        );
        Ok(())
    }

    /// Register `child` as a submethod of `parent` (an `else` for an `if`).
    pub fn enhance_method(&mut self, parent: &str, child: &str, start: &str) -> Result<(), CompileError> {
        let Some(method) = self.methods.get_mut(parent) else {
            return Err(self.unknown(parent));
        };
        if !method.submethods.iter().any(|s| s == child) {
            method.submethods.push(child.to_string());
        }
        self.add_method(child, start, None)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn has_end(&self, name: &str) -> bool {
        self.methods.get(name).is_some_and(|m| m.end.is_some())
    }

    /// True when `name` continues the innermost open call at the same indent.
    pub fn is_submethod(&self, name: &str, indent: usize) -> bool {
        self.open_calls.last().is_some_and(|(open, level)| {
            *level == indent
                && self
                    .methods
                    .get(open)
                    .is_some_and(|m| m.submethods.iter().any(|s| s == name))
        })
    }

    /// True when some method lists `name` as a submethod.
    pub fn is_any_submethod(&self, name: &str) -> bool {
        self.methods
            .values()
            .any(|m| m.submethods.iter().any(|s| s == name))
    }

    /// Render the start directive of `name`. A call with an indent is a
    /// block call and updates the open-call stack; inline calls pass `None`.
    pub fn call_method(
        &mut self,
        name: &str,
        arguments: &[String],
        indent: Option<usize>,
    ) -> Result<String, CompileError> {
        let method = self.methods.get(name).ok_or_else(|| self.unknown(name))?;
        if arguments.len() != method.start.holes() {
            return Err(CompileError::TemplateEngine(format!(
                "TemplateEngine method {} takes {} variables, {} given",
                name,
                method.start.holes(),
                arguments.len()
            )));
        }
        let rendered = self.tag.render(&[method.start.render(arguments)]);

        if let Some(indent) = indent {
            if !self.is_submethod(name, indent) {
                while self.open_calls.last().is_some_and(|(_, level)| *level >= indent) {
                    self.open_calls.pop();
                }
                self.open_calls.push((name.to_string(), indent));
            }
        }
        Ok(rendered)
    }

    /// The end directive of `name`, if it has one. `pop` also closes the
    /// innermost open call.
    pub fn end_method(&mut self, name: &str, pop: bool) -> Option<String> {
        if pop {
            self.open_calls.pop();
        }
        let end = self.methods.get(name)?.end.as_ref()?;
        Some(self.tag.render(&[end.render::<&str>(&[])]))
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.len()
    }

    fn unknown(&self, method: &str) -> CompileError {
        CompileError::TemplateEngine(format!(
            "'{}' is not a method of TemplateEngine '{}'",
            method, self.name
        ))
    }
}

// ---- Declarations ----

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `name = TemplateEngine("{%% %s %%}")`
    Engine { name: String, format: String },
    /// `engine.method = create("start", "end")`
    Create {
        engine: String,
        method: String,
        start: String,
        end: Option<String>,
    },
    /// `engine.child = engine.parent.append("start")`
    Append {
        engine: String,
        parent: String,
        method: String,
        start: String,
    },
}

/// Recognize a template engine declaration. Lines that merely look like
/// one are errors rather than falling through to markup.
pub fn parse_declaration(text: &str) -> Result<Option<Declaration>, CompileError> {
    let text = text.trim();
    if !DECLARATION_SHAPE.is_match(text) {
        return Ok(None);
    }
    let malformed = |reason: &str| CompileError::TemplateEngine(format!("{}: {}", reason, text));

    if let Some(caps) = ENGINE_DECLARATION.captures(text) {
        let arguments = quoted_arguments(&caps[2])?;
        let [format] = arguments.as_slice() else {
            return Err(malformed("TemplateEngine takes one quoted tag format"));
        };
        return Ok(Some(Declaration::Engine {
            name: caps[1].to_string(),
            format: format.clone(),
        }));
    }

    if let Some(caps) = CREATE_DECLARATION.captures(text) {
        let mut arguments = quoted_arguments(&caps[3])?.into_iter();
        let (Some(start), end, None) = (arguments.next(), arguments.next(), arguments.next()) else {
            return Err(malformed("create takes a start format and an optional end format"));
        };
        return Ok(Some(Declaration::Create {
            engine: caps[1].to_string(),
            method: caps[2].to_string(),
            start,
            end,
        }));
    }

    if let Some(caps) = APPEND_DECLARATION.captures(text) {
        if caps[1] != caps[3] {
            return Err(malformed(
                "a submethod must belong to the same TemplateEngine as its parent",
            ));
        }
        let arguments = quoted_arguments(&caps[5])?;
        let [start] = arguments.as_slice() else {
            return Err(malformed("append takes one quoted start format"));
        };
        return Ok(Some(Declaration::Append {
            engine: caps[1].to_string(),
            parent: caps[4].to_string(),
            method: caps[2].to_string(),
            start: start.clone(),
        }));
    }

    Err(malformed("improper TemplateEngine declaration"))
}

fn quoted_arguments(list: &str) -> Result<Vec<String>, CompileError> {
    split_arguments(list)?
        .iter()
        .map(|argument| {
            unquote(argument).map(str::to_string).ok_or_else(|| {
                CompileError::TemplateEngine(format!(
                    "expected a quoted string, found {}",
                    argument
                ))
            })
        })
        .collect()
}

// ---- Calls ----

/// One `engine.method(...)` occurrence within a line.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Byte range of the whole call, parentheses included.
    pub range: Range<usize>,
    pub engine: String,
    pub method: String,
    pub arguments: Vec<String>,
}

/// Find every call of a registered engine outside quoted strings. A fully
/// quoted argument is passed without its quotes.
pub fn find_calls(
    text: &str,
    engines: &HashMap<String, TemplateEngine>,
) -> Result<Vec<CallSite>, CompileError> {
    let outside: Vec<usize> = unquoted(text).map(|(index, _)| index).collect();
    let mut calls = Vec::new();
    let mut resume = 0;

    for caps in CALL.captures_iter(text) {
        let (Some(whole), Some(engine), Some(method)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if whole.start() < resume || outside.binary_search(&whole.start()).is_err() {
            continue;
        }
        let boundary = text[..whole.start()]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '#' | '-')));
        if !boundary || !engines.contains_key(engine.as_str()) {
            continue;
        }
        if text[whole.end()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            continue;
        }

        let after = &text[whole.end()..];
        let gap = after.len() - after.trim_start().len();
        let (end, arguments) = if after.trim_start().starts_with('(') {
            let open = whole.end() + gap;
            let close = matching_paren(text, open).ok_or_else(|| {
                CompileError::TemplateEngine(format!("unclosed call in '{}'", text.trim()))
            })?;
            let arguments = split_arguments(&text[open + 1..close])?
                .into_iter()
                .map(|argument| unquote(&argument).map(str::to_string).unwrap_or(argument))
                .collect();
            (close + 1, arguments)
        } else {
            (whole.end(), Vec::new())
        };

        calls.push(CallSite {
            range: whole.start()..end,
            engine: engine.as_str().to_string(),
            method: method.as_str().to_string(),
            arguments,
        });
        resume = end;
    }

    Ok(calls)
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in unquoted(&text[open..]) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
