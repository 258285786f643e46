use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use codespan_reporting::diagnostic::{Diagnostic, Label};
use pyml::SyntaxError;

#[derive(Debug)]
pub enum CompileError {
    Syntax(SyntaxError),
    UndefinedVariable(String),
    IllegalAssignment(String),
    MultipleAssignment(String),
    MissingValue(String),
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },
    InvalidTag(String),
    InvalidAttribute {
        attribute: String,
        tag: String,
    },
    InvalidMethodName(String),
    InvalidParameter(String),
    ReservedName(String),
    InvalidMath {
        expression: String,
        reason: String,
    },
    InvalidColor(String),
    InvalidLoop(String),
    IteratorReuse(String),
    TemplateEngine(String),
    Verbatim(String),
    InvalidImport(String),
    MisplacedDefinition(String),
    ModuleNotFound(String),
    RecursionLimit {
        method: String,
        depth: usize,
    },
    Shell {
        command: String,
        message: String,
    },
    Io(String),
    Internal(String),
    /// An error already located inside an imported module.
    InModule(Box<DiagnosticError>),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Syntax(error) => error.fmt(f),
            CompileError::UndefinedVariable(name) => {
                write!(f, "variable '{}' used prior to definition", name)
            }
            CompileError::IllegalAssignment(target) => {
                write!(f, "illegal assignment to a constant '{}'", target)
            }
            CompileError::MultipleAssignment(line) => write!(
                f,
                "'{}' has multiple assignment operators, only one is allowed here",
                line
            ),
            CompileError::MissingValue(name) => {
                write!(f, "cannot declare variable '{}' without assignment", name)
            }
            CompileError::ArgumentCount {
                method,
                expected,
                got,
            } => write!(
                f,
                "method '{}' expects {} arguments, {} given",
                method, expected, got
            ),
            CompileError::InvalidTag(tag) => {
                write!(f, "'{}' is not a valid markup tag or method name", tag)
            }
            CompileError::InvalidAttribute { attribute, tag } => write!(
                f,
                "'{}' is not one of allowed attributes for '{}' element",
                attribute, tag
            ),
            CompileError::InvalidMethodName(name) => write!(
                f,
                "'{}' is not a valid method name, only letters, digits and underscores are allowed",
                name
            ),
            CompileError::InvalidParameter(parameter) => write!(
                f,
                "method parameters must be variables, found '{}'",
                parameter
            ),
            CompileError::ReservedName(name) => write!(
                f,
                "'{}' is a reserved name and cannot be used as a method name",
                name
            ),
            CompileError::InvalidMath { expression, reason } => {
                write!(f, "'{}' is not a valid mathematical operation: {}", expression, reason)
            }
            CompileError::InvalidColor(color) => {
                write!(f, "color '{}' is not a valid HTML color", color)
            }
            CompileError::InvalidLoop(message) => write!(f, "invalid loop: {}", message),
            CompileError::IteratorReuse(name) => write!(
                f,
                "can't reuse previously defined variable {} as loop iterator",
                name
            ),
            CompileError::TemplateEngine(message) => write!(f, "template engine: {}", message),
            CompileError::Verbatim(message) => write!(f, "verbatim block: {}", message),
            CompileError::InvalidImport(message) => write!(f, "invalid import: {}", message),
            CompileError::MisplacedDefinition(what) => {
                write!(f, "'{}' is only allowed at the top level of a file", what)
            }
            CompileError::ModuleNotFound(module) => {
                write!(f, "can't import '{}', module doesn't exist", module)
            }
            CompileError::RecursionLimit { method, depth } => write!(
                f,
                "expansion depth limit of {} exceeded while expanding '{}'",
                depth, method
            ),
            CompileError::Shell { command, message } => {
                write!(f, "shell command '{}' failed: {}", command, message)
            }
            CompileError::Io(message) => write!(f, "I/O error: {}", message),
            CompileError::Internal(message) => write!(f, "internal error: {}", message),
            CompileError::InModule(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<SyntaxError> for CompileError {
    fn from(error: SyntaxError) -> Self {
        CompileError::Syntax(error)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(error: std::io::Error) -> Self {
        CompileError::Io(error.to_string())
    }
}

/// A compilation error annotated with where it happened.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: CompileError,
    pub file: PathBuf,
    /// 1-based line number; 0 when the error is not tied to a line.
    pub line: usize,
    /// The offending logical line as written.
    pub source_line: String,
}

impl DiagnosticError {
    pub fn new(error: CompileError, file: &Path, line: usize, source_line: &str) -> Self {
        DiagnosticError {
            error,
            file: file.to_path_buf(),
            line,
            source_line: source_line.to_string(),
        }
    }

    pub fn unlocated(error: CompileError, file: &Path) -> Self {
        DiagnosticError::new(error, file, 0, "")
    }

    /// True for failures of an external code block command.
    pub fn is_shell(&self) -> bool {
        matches!(self.error, CompileError::Shell { .. })
    }

    /// Byte range of the offending line within `source`.
    pub fn span(&self, source: &str) -> Option<Range<usize>> {
        if self.line == 0 {
            return None;
        }
        let mut start = 0;
        for (index, line) in source.split_inclusive('\n').enumerate() {
            if index + 1 == self.line {
                let text = line.trim_end_matches(['\n', '\r']);
                return Some(start..start + text.len());
            }
            start += line.len();
        }
        None
    }

    /// Convert to a codespan-reporting Diagnostic labelled on the offending line.
    pub fn to_diagnostic(&self, file_id: usize, source: &str) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::error().with_message(self.error.to_string());
        match self.span(source) {
            Some(span) => diagnostic.with_labels(vec![Label::primary(file_id, span)]),
            None => diagnostic,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "error in {}: {}", self.file.display(), self.error)
        } else {
            write!(
                f,
                "error in {}: line {}: {}\n    {}",
                self.file.display(),
                self.line,
                self.error,
                self.source_line.trim_end()
            )
        }
    }
}

impl std::error::Error for DiagnosticError {}
