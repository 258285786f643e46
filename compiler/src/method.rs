//! Compile-time macros. A `def` block and a loop body both become a
//! [`Method`]: a parameter list plus recorded body lines that are
//! re-evaluated on every invocation.

use pyml::syntax::{count_unquoted, find_unquoted, is_variable};

use crate::color::ColorTable;
use crate::environment::Heap;
use crate::error::CompileError;
use crate::evaluator::{evaluate_line, resolve, substitute_named};

const COMPOUND_OPERATORS: [(&str, char); 4] = [("+=", '+'), ("-=", '-'), ("*=", '*'), ("/=", '/')];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapPolicy {
    /// Runs against a private copy of the global heap.
    Copy,
    /// Runs against the heap of whoever invokes it.
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineRecord {
    Normal { depth: usize, text: String },
    /// Copied through with only the named variables substituted.
    Verbatim {
        depth: usize,
        text: String,
        variables: Vec<String>,
    },
}

impl LineRecord {
    /// Indent levels below the body's own.
    pub fn depth(&self) -> usize {
        match self {
            LineRecord::Normal { depth, .. } | LineRecord::Verbatim { depth, .. } => *depth,
        }
    }
}

/// An evaluated body line, ready to be indented for its call site.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyLine {
    pub depth: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<String>,
    pub policy: HeapPolicy,
    body: Vec<LineRecord>,
    locals: Vec<String>,
    /// Indentation unit of the file the body was written in.
    unit: Option<String>,
}

impl Method {
    pub fn new(name: impl Into<String>, parameters: Vec<String>, policy: HeapPolicy) -> Self {
        Method {
            name: name.into(),
            parameters,
            policy,
            body: Vec::new(),
            locals: Vec::new(),
            unit: None,
        }
    }

    pub fn body(&self) -> &[LineRecord] {
        &self.body
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn set_unit(&mut self, unit: Option<&str>) {
        self.unit = unit.map(str::to_string);
    }

    /// Record a body line `depth` levels below the body. Compound
    /// assignment is rewritten to `:=` and assignment targets become locals.
    pub fn add_line(&mut self, depth: usize, text: &str) {
        let text = expand_assignment(text.trim_start());
        if let Some(op) = find_unquoted(&text, ":=") {
            let target = text[..op].trim();
            if is_variable(target) && !self.is_local(target) {
                self.locals.push(target.to_string());
            }
        }
        self.body.push(LineRecord::Normal { depth, text });
    }

    pub fn add_verbatim(&mut self, depth: usize, text: &str, variables: Vec<String>) {
        self.body.push(LineRecord::Verbatim {
            depth,
            text: text.to_string(),
            variables,
        });
    }

    /// Parameters and variables assigned in the body.
    pub fn is_local(&self, name: &str) -> bool {
        self.parameters.iter().chain(&self.locals).any(|local| local == name)
    }

    pub fn locals(&self) -> impl Iterator<Item = &String> {
        self.parameters.iter().chain(&self.locals)
    }

    /// Bind the arguments into `heap`.
    pub fn bind(&self, arguments: &[String], heap: &mut Heap) -> Result<(), CompileError> {
        if arguments.len() != self.parameters.len() {
            return Err(CompileError::ArgumentCount {
                method: self.name.clone(),
                expected: self.parameters.len(),
                got: arguments.len(),
            });
        }
        for (parameter, argument) in self.parameters.iter().zip(arguments) {
            heap.set(parameter, argument.as_str());
        }
        Ok(())
    }

    /// Evaluate body line `index` against `heap`. Assignments update the
    /// heap and yield `None`, everything else yields the evaluated text.
    /// Returns `None` past the end of the body.
    pub fn run_line(
        &self,
        index: usize,
        heap: &mut Heap,
        colors: &ColorTable,
    ) -> Option<Result<Option<BodyLine>, CompileError>> {
        let record = self.body.get(index)?;
        let depth = record.depth();
        Some(evaluate_record(record, heap, colors).map(|text| text.map(|text| BodyLine { depth, text })))
    }
}

fn evaluate_record(
    record: &LineRecord,
    heap: &mut Heap,
    colors: &ColorTable,
) -> Result<Option<String>, CompileError> {
    let text = match record {
        LineRecord::Verbatim {
            text, variables, ..
        } => {
            return substitute_named(text, variables, heap).map(Some);
        }
        LineRecord::Normal { text, .. } => text,
    };

    match count_unquoted(text, ":=") {
        0 => {
            let resolved = resolve(text, heap, &[])?;
            evaluate_line(&resolved, colors).map(Some)
        }
        1 => {
            let Some(op) = find_unquoted(text, ":=") else {
                return Err(CompileError::Internal(format!("lost ':=' in '{}'", text)));
            };
            let target = text[..op].trim();
            if !is_variable(target) {
                return Err(CompileError::IllegalAssignment(target.to_string()));
            }
            let value = resolve(text[op + 2..].trim(), heap, &[])?;
            let value = evaluate_line(&value, colors)?;
            heap.set(target, value);
            Ok(None)
        }
        _ => Err(CompileError::MultipleAssignment(text.trim().to_string())),
    }
}

/// Rewrite `$a += x` as `$a := $a + (x)`. Lines without a compound
/// operator after a variable are returned unchanged.
pub fn expand_assignment(text: &str) -> String {
    for (operator, symbol) in COMPOUND_OPERATORS {
        let Some(at) = find_unquoted(text, operator) else {
            continue;
        };
        let target = text[..at].trim();
        if !is_variable(target) {
            continue;
        }
        let ws = &text[..text.len() - text.trim_start().len()];
        let value = text[at + operator.len()..].trim();
        return format!("{}{} := {} {} ({})", ws, target, target, symbol, value);
    }
    text.to_string()
}

/// True when `text` is a compound assignment to a variable.
pub fn is_compound_assignment(text: &str) -> bool {
    expand_assignment(text) != text
}
