//! The per-line compiler. One [`Parser`] owns every piece of compilation
//! state; imported modules are compiled into the same instance.

mod classify;
mod collect;
mod emit;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pyml::{IndentTracker, LogicalLine, MarkupRules, logical_lines};

use crate::color::ColorTable;
use crate::environment::Environment;
use crate::error::{CompileError, DiagnosticError};
use crate::method::Method;
use crate::options::CompilerOptions;
use crate::output::OutputBuffer;
use crate::template_engine::TemplateEngine;
use crate::verbatim::{OpenVerbatim, VerbatimDefinition};

use classify::LineKind;
use collect::Collector;

/// Prefix of the synthetic methods loops are compiled into.
const LOOP_PREFIX: &str = "__loop_";

/// Words that cannot name a method.
const RESERVED: &[&str] = &[
    "create",
    "append",
    "verbatim",
    "verbatim_line",
    "code_block",
    "TemplateEngine",
    "import",
    "for",
    "def",
];

/// What to write when the block opened at some indent level ends.
#[derive(Debug, Clone, PartialEq)]
enum Closing {
    Nothing,
    Element { name: String, text: String },
    Engine { engine: String, method: String, ws: String },
}

/// A macro call whose body is being fed back through dispatch.
#[derive(Debug)]
struct Expansion {
    method: Rc<Method>,
    /// Index of the next body line.
    next: usize,
    /// Indent level of the call site.
    level: usize,
    /// Runs in a heap frame of its own.
    framed: bool,
}

/// The element written most recently, with the output length right after
/// its start tag.
#[derive(Debug, Clone)]
struct OpenedTag {
    name: String,
    mark: usize,
    /// The start tag line also carries text content.
    inline: bool,
}

pub struct Parser {
    options: CompilerOptions,
    rules: MarkupRules,
    colors: &'static ColorTable,
    indent: IndentTracker,
    env: Environment,
    methods: HashMap<String, Rc<Method>>,
    engines: HashMap<String, TemplateEngine>,
    verbatims: HashMap<String, VerbatimDefinition>,
    verbatim: Option<OpenVerbatim>,
    collectors: Vec<Collector>,
    elements: Vec<Closing>,
    last_opened: Option<OpenedTag>,
    output: OutputBuffer,
    imported: HashSet<String>,
    iterators: HashSet<String>,
    loop_counter: usize,
    /// Macro calls being expanded, innermost last.
    expansions: Vec<Expansion>,
    /// Directories of the files being compiled, innermost last.
    dirs: Vec<PathBuf>,
}

impl Parser {
    pub fn new(rules: MarkupRules, options: CompilerOptions) -> Self {
        Parser {
            options,
            rules,
            colors: ColorTable::html(),
            indent: IndentTracker::new(),
            env: Environment::new(),
            methods: HashMap::new(),
            engines: HashMap::new(),
            verbatims: HashMap::new(),
            verbatim: None,
            collectors: Vec::new(),
            elements: Vec::new(),
            last_opened: None,
            output: OutputBuffer::new(),
            imported: HashSet::new(),
            iterators: HashSet::new(),
            loop_counter: 0,
            expansions: Vec::new(),
            dirs: Vec::new(),
        }
    }

    pub fn compile_file(&mut self, path: &Path) -> Result<(), DiagnosticError> {
        let source = fs::read_to_string(path)
            .map_err(|e| DiagnosticError::unlocated(CompileError::from(e), path))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.compile_source(&source, path, base_dir)
    }

    /// Compile `source` into the output. `name` labels diagnostics and
    /// `base_dir` is where its imports are looked up first.
    pub fn compile_source(
        &mut self,
        source: &str,
        name: &Path,
        base_dir: &Path,
    ) -> Result<(), DiagnosticError> {
        log::info!("compiling {}", name.display());
        self.dirs.push(base_dir.to_path_buf());
        let result = self.compile_lines(source, name);
        self.dirs.pop();
        if result.is_ok() {
            log::info!("finished {} ({} bytes of output)", name.display(), self.output.len());
        }
        result
    }

    fn compile_lines(&mut self, source: &str, name: &Path) -> Result<(), DiagnosticError> {
        let lines = logical_lines(source);
        for line in &lines {
            self.handle_line(&line.text)
                .map_err(|error| locate(error, name, line))?;
        }

        let last = lines.last().cloned().unwrap_or(LogicalLine {
            number: 0,
            text: String::new(),
        });
        self.end_of_input().map_err(|error| locate(error, name, &last))
    }

    pub fn output(&self) -> &str {
        self.output.as_str()
    }

    pub fn into_output(self) -> String {
        self.output.into_string()
    }

    /// Names of the user-defined methods, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .methods
            .keys()
            .map(String::as_str)
            .filter(|name| !name.starts_with(LOOP_PREFIX))
            .collect();
        names.sort_unstable();
        names
    }

    /// A variable of the global heap.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.env.global().get(name)
    }

    // ---- Dispatch ----

    /// Compile one logical line, along with every macro expansion it
    /// starts. Expansions run off an explicit stack, so nesting depth is
    /// bounded by `max_depth` rather than by the thread's stack.
    fn handle_line(&mut self, raw: &str) -> Result<(), CompileError> {
        let base = self.expansions.len();
        let result = self
            .dispatch(raw)
            .and_then(|()| self.drain_expansions(base));
        if result.is_err() {
            while self.expansions.len() > base {
                self.finish_expansion();
            }
        }
        result
    }

    /// Feed the body lines of the expansions above `base` through dispatch,
    /// innermost first, until all of them are exhausted.
    fn drain_expansions(&mut self, base: usize) -> Result<(), CompileError> {
        while self.expansions.len() > base {
            let Some(expansion) = self.expansions.last_mut() else {
                break;
            };
            let index = expansion.next;
            expansion.next += 1;
            let method = Rc::clone(&expansion.method);
            let level = expansion.level;

            let Some(line) = method.run_line(index, self.env.current_mut(), self.colors) else {
                self.finish_expansion();
                continue;
            };
            let Some(line) = line? else {
                continue;
            };
            // A caller with no indentation yet borrows the body's unit.
            if line.depth > 0 {
                if let Some(unit) = method.unit() {
                    self.indent.adopt_unit(unit);
                }
            }
            let ws = self.indent.indent_to(level + line.depth);
            self.dispatch(&format!("{}{}", ws, line.text))?;
        }
        Ok(())
    }

    fn finish_expansion(&mut self) {
        if let Some(expansion) = self.expansions.pop() {
            if expansion.framed {
                self.env.pop_frame();
            }
        }
    }

    /// Compile one logical line. Lines that end a pending block (a loop, a
    /// method body, a verbatim region) first close it and are then
    /// classified again.
    fn dispatch(&mut self, raw: &str) -> Result<(), CompileError> {
        loop {
            let (kind, level) = self.classify(raw)?;
            log::trace!("line {:?} at level {}: {:?}", raw.trim(), level, kind);

            match kind {
                LineKind::Skip => {}
                LineKind::VerbatimBody => self.verbatim_body(raw, level)?,
                LineKind::VerbatimEnd => {
                    self.flush_verbatim()?;
                    continue;
                }
                LineKind::CaptureVerbatim => self.capture_verbatim(raw)?,
                LineKind::EndCapture => {
                    if let Some(collector) = self.collectors.last_mut() {
                        collector.capture = None;
                    }
                    continue;
                }
                LineKind::CloseCollector => {
                    self.close_collector()?;
                    continue;
                }
                LineKind::Collect => self.collect_line(raw, level)?,
                LineKind::VerbatimDeclaration(definition) => {
                    log::debug!("verbatim block '{}' declared", definition.name);
                    self.verbatims.insert(definition.name.clone(), definition);
                }
                LineKind::LoopHeader => self.open_loop(raw.trim(), level)?,
                LineKind::MethodHeader => self.open_method(raw.trim(), level)?,
                LineKind::VerbatimOpen => self.open_verbatim(raw.trim(), level)?,
                LineKind::Assignment => self.assign(raw.trim())?,
                LineKind::CompoundAssignment => {
                    let expanded = crate::method::expand_assignment(raw.trim());
                    self.assign(&expanded)?;
                }
                LineKind::Import => self.import(raw.trim(), level)?,
                LineKind::EngineDeclaration(declaration) => self.declare(declaration)?,
                LineKind::EngineCall => self.engine_call(raw.trim(), level)?,
                LineKind::Markup => self.markup(raw.trim(), level)?,
            }
            return Ok(());
        }
    }

    /// Flush whatever is still open once the input runs out.
    fn end_of_input(&mut self) -> Result<(), CompileError> {
        if self.verbatim.is_some() {
            self.flush_verbatim()?;
        }
        while !self.collectors.is_empty() {
            self.close_collector()?;
        }
        if self.verbatim.is_some() {
            self.flush_verbatim()?;
        }
        self.close_all()
    }
}

fn locate(error: CompileError, file: &Path, line: &LogicalLine) -> DiagnosticError {
    match error {
        CompileError::InModule(inner) => *inner,
        error => {
            if let CompileError::Internal(message) = &error {
                log::error!(
                    "{}: line {}: internal error on {:?}: {}",
                    file.display(),
                    line.number,
                    line.text,
                    message
                );
            }
            DiagnosticError::new(error, file, line.number, &line.text)
        }
    }
}
