//! Verbatim regions: named blocks whose body is copied through untouched
//! apart from the variables named when the block is opened.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use once_cell::sync::Lazy;
use regex::Regex;

use pyml::line::is_blank;
use pyml::syntax::{is_variable, parse_definition, split_arguments, split_call, unquote};
use pyml::{end_tag, start_tag};

use crate::error::CompileError;

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(verbatim|verbatim_line|code_block)\s*\((.*)\)\s*$")
        .unwrap()
});
static COLLAPSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum VerbatimMode {
    Multiline,
    /// Internal newlines and indentation fold into single spaces.
    SingleLine,
    /// The body is piped through a shell command.
    CodeBlock { command: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerbatimDefinition {
    pub name: String,
    pub start: String,
    pub end: String,
    pub mode: VerbatimMode,
}

pub fn is_declaration(text: &str) -> bool {
    DECLARATION.is_match(text.trim())
}

/// Parse `name = verbatim(...)`, `verbatim_line(...)` or `code_block(...)`.
///
/// The wrapper is either nothing, one tag expression such as
/// `script(type="text/javascript")`, or two quoted strings for literal start
/// and end text. `code_block` takes its shell command as a last quoted
/// argument.
pub fn parse_declaration(text: &str) -> Result<Option<VerbatimDefinition>, CompileError> {
    let Some(caps) = DECLARATION.captures(text.trim()) else {
        return Ok(None);
    };
    let kind = &caps[2];
    let mut arguments = split_arguments(&caps[3])?;

    let mode = match kind {
        "verbatim" => VerbatimMode::Multiline,
        "verbatim_line" => VerbatimMode::SingleLine,
        _ => {
            let command = arguments
                .pop()
                .and_then(|last| unquote(&last).map(str::to_string))
                .ok_or_else(|| {
                    CompileError::Verbatim(
                        "code_block takes the shell command as its last quoted argument"
                            .to_string(),
                    )
                })?;
            VerbatimMode::CodeBlock { command }
        }
    };

    let (start, end) = match arguments.as_slice() {
        [] => (String::new(), String::new()),
        [tag] => {
            let (name, attributes) = parse_definition(tag)?;
            (start_tag(&name, &attributes), end_tag(&name))
        }
        [start, end] => match (unquote(start), unquote(end)) {
            (Some(start), Some(end)) => (format!("{}\n", start), format!("{}\n", end)),
            _ => {
                return Err(CompileError::Verbatim(format!(
                    "start and end text of '{}' must be quoted strings",
                    &caps[1]
                )));
            }
        },
        other => {
            let accepted = if kind == "code_block" { "1, 2 or 3" } else { "0, 1 or 2" };
            let given = other.len() + usize::from(kind == "code_block");
            return Err(CompileError::Verbatim(format!(
                "{} takes {} arguments, {} given",
                kind, accepted, given
            )));
        }
    };

    Ok(Some(VerbatimDefinition {
        name: caps[1].to_string(),
        start,
        end,
        mode,
    }))
}

/// The block name of an opener line: `css:` or `css($a, $b):`.
pub fn opener_name(text: &str) -> &str {
    let text = text.trim();
    let head = text.split('(').next().unwrap_or(text);
    head.trim().trim_end_matches(':').trim()
}

/// The variables an opener line asks to interpolate.
pub fn opener_variables(text: &str) -> Result<Vec<String>, CompileError> {
    let (_, arguments) = split_call(text.trim())?;
    let Some(arguments) = arguments else {
        return Ok(Vec::new());
    };
    let variables = split_arguments(arguments)?;
    if let Some(bad) = variables.iter().find(|v| !is_variable(v)) {
        return Err(CompileError::Verbatim(format!(
            "only variables can be passed to a verbatim block, found '{}'",
            bad
        )));
    }
    Ok(variables)
}

/// A verbatim block being buffered.
#[derive(Debug, Clone)]
pub struct OpenVerbatim {
    pub definition: VerbatimDefinition,
    /// Indent level of the opener line.
    pub level: usize,
    pub variables: Vec<String>,
    lines: Vec<String>,
}

impl OpenVerbatim {
    pub fn new(definition: VerbatimDefinition, level: usize, variables: Vec<String>) -> Self {
        OpenVerbatim {
            definition,
            level,
            variables,
            lines: Vec::new(),
        }
    }

    /// Blank lines and lines deeper than the opener belong to the body.
    pub fn contains(&self, raw: &str, level: usize) -> bool {
        is_blank(raw) || level > self.level
    }

    /// Add a body line, already dedented to the body level.
    pub fn push(&mut self, line: &str) {
        self.lines.push(line.trim_end_matches(['\n', '\r']).to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the block. `outer` is the opener's indentation and `unit` one
    /// indent unit; body lines sit one unit deeper than a wrapper.
    pub fn finish(&self, outer: &str, unit: &str) -> Result<String, CompileError> {
        let mut lines = self.lines.as_slice();
        while let Some((last, rest)) = lines.split_last() {
            if !last.trim().is_empty() {
                break;
            }
            lines = rest;
        }

        let definition = &self.definition;
        let inner = if definition.start.is_empty() {
            outer.to_string()
        } else {
            format!("{}{}", outer, unit)
        };

        let body = match &definition.mode {
            VerbatimMode::CodeBlock { command } => {
                let input: String = lines.iter().map(|line| format!("{}\n", line)).collect();
                let mut output = run_shell(command, &input)?;
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
                output
            }
            _ => lines
                .iter()
                .map(|line| {
                    if line.trim().is_empty() {
                        "\n".to_string()
                    } else {
                        format!("{}{}\n", inner, line)
                    }
                })
                .collect(),
        };

        let mut text = String::new();
        if !definition.start.is_empty() {
            text.push_str(outer);
            text.push_str(&definition.start);
        }
        text.push_str(&body);
        if !definition.end.is_empty() {
            text.push_str(outer);
            text.push_str(&definition.end);
        }

        if definition.mode == VerbatimMode::SingleLine {
            let collapsed = COLLAPSE.replace_all(text.trim_end(), " ");
            return Ok(format!("{}\n", collapsed));
        }
        Ok(text)
    }
}

/// Run `command` through `sh -c` with `input` on standard input and return
/// its standard output. Anything on standard error is a failure.
pub fn run_shell(command: &str, input: &str) -> Result<String, CompileError> {
    let command = command.trim().trim_start_matches('|').trim();
    let shell_error = |message: String| CompileError::Shell {
        command: command.to_string(),
        message,
    };
    log::debug!("running code block command '{}'", command);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| shell_error(e.to_string()))?;

    let writer = child.stdin.take().map(|mut stdin| {
        let input = input.to_string();
        thread::spawn(move || stdin.write_all(input.as_bytes()))
    });

    let output = child
        .wait_with_output()
        .map_err(|e| shell_error(e.to_string()))?;
    let written = writer.map(|writer| writer.join());

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return Err(shell_error(stderr.trim().to_string()));
    }
    if !output.status.success() {
        return Err(shell_error(format!("exited with {}", output.status)));
    }
    match written {
        Some(Err(_)) => return Err(shell_error("writing standard input panicked".to_string())),
        // A command that ignores its input closes the pipe early.
        Some(Ok(Err(e))) if e.kind() != io::ErrorKind::BrokenPipe => {
            return Err(shell_error(format!("cannot write standard input: {}", e)));
        }
        _ => {}
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
