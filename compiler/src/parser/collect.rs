//! Method definitions and loops: collecting their bodies and, for loops,
//! unrolling them once the body ends.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use pyml::syntax::{is_identifier, is_variable, parse_definition, split_arguments};

use crate::error::CompileError;
use crate::evaluator::{resolve, substitute_named};
use crate::method::{HeapPolicy, Method};
use crate::verbatim::{opener_name, opener_variables};

use super::{Closing, LOOP_PREFIX, Parser, RESERVED};

static LOOP_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^for\s+(\$[A-Za-z_][A-Za-z0-9_]*)\s+in\s+(.+?)\s*:?\s*$").unwrap()
});

/// A method or loop whose body is being recorded.
#[derive(Debug)]
pub(super) struct Collector {
    pub(super) method: Method,
    /// Indent level of the body lines.
    pub(super) base: usize,
    pub(super) kind: CollectorKind,
    pub(super) capture: Option<Capture>,
    /// Loop methods generated for loops nested in this body.
    pub(super) nested: Vec<String>,
}

#[derive(Debug)]
pub(super) enum CollectorKind {
    Definition,
    Loop { level: usize, values: Vec<String> },
}

/// A verbatim block inside a body being recorded.
#[derive(Debug)]
pub(super) struct Capture {
    /// Indent level of the opener line.
    pub(super) level: usize,
    /// Opener variables that belong to the body; substituted per invocation.
    pub(super) deferred: Vec<String>,
    /// Opener variables from outside; substituted now.
    pub(super) outer: Vec<String>,
}

impl Collector {
    fn new(method: Method, base: usize, kind: CollectorKind) -> Self {
        Collector {
            method,
            base,
            kind,
            capture: None,
            nested: Vec::new(),
        }
    }
}

impl Parser {
    /// `def name($a, $b):`
    pub(super) fn open_method(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        if level != 0 {
            return Err(CompileError::MisplacedDefinition("def".to_string()));
        }
        let header = text.trim_start_matches("def").trim();
        let (name, parameters) = parse_definition(header)?;

        if !is_identifier(&name) {
            return Err(CompileError::InvalidMethodName(name));
        }
        if RESERVED.contains(&name.as_str()) || self.rules.defines(&name) {
            return Err(CompileError::ReservedName(name));
        }
        if let Some(bad) = parameters.iter().find(|p| !is_variable(p)) {
            return Err(CompileError::InvalidParameter(bad.clone()));
        }

        self.open_block(level, Closing::Nothing)?;
        self.last_opened = None;
        let method = Method::new(name, parameters, HeapPolicy::Copy);
        self.collectors
            .push(Collector::new(method, level + 1, CollectorKind::Definition));
        Ok(())
    }

    /// `for $item in [a, b, c]:`. The values must be a list once variables,
    /// ranges and indexing are resolved; variables of enclosing bodies are
    /// left for the body invocation to fill in.
    pub(super) fn open_loop(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        let caps = LOOP_HEADER
            .captures(text)
            .ok_or_else(|| CompileError::InvalidLoop(format!("expected 'for $name in [...]:', found '{}'", text)))?;
        let iterator = caps[1].to_string();

        if self.env.current().contains(&iterator) && !self.iterators.contains(&iterator) {
            return Err(CompileError::IteratorReuse(iterator));
        }

        let mut ignore = self.collector_locals();
        ignore.push(iterator.clone());
        let resolved = resolve(&caps[2], self.env.current(), &ignore)?;
        let list = resolved
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| {
                CompileError::InvalidLoop(format!("'{}' is not a list", resolved.trim()))
            })?;
        let values = split_arguments(list)?;

        let name = format!("{}{}", LOOP_PREFIX, self.loop_counter);
        self.loop_counter += 1;
        self.iterators.insert(iterator.clone());

        if self.collectors.is_empty() {
            self.open_block(level, Closing::Nothing)?;
            self.last_opened = None;
        }
        log::debug!("loop {} over {} values bound to {}", name, values.len(), iterator);
        let method = Method::new(name, vec![iterator], HeapPolicy::Shared);
        self.collectors.push(Collector::new(
            method,
            level + 1,
            CollectorKind::Loop { level, values },
        ));
        Ok(())
    }

    /// Record a body line relative to the body's indent level.
    pub(super) fn collect_line(&mut self, raw: &str, level: usize) -> Result<(), CompileError> {
        let locals = self.collector_locals();
        let Some(collector) = self.collectors.last_mut() else {
            return Err(CompileError::Internal("no body is being collected".to_string()));
        };
        let depth = level.saturating_sub(collector.base);
        let text = raw.trim_start();

        if self.verbatims.contains_key(opener_name(text)) {
            let (deferred, outer): (Vec<String>, Vec<String>) = opener_variables(text)?
                .into_iter()
                .partition(|variable| locals.contains(variable));
            collector.method.add_verbatim(depth, text, Vec::new());
            collector.capture = Some(Capture {
                level,
                deferred,
                outer,
            });
        } else {
            collector.method.add_line(depth, text);
        }
        Ok(())
    }

    /// Record a verbatim body line of a method or loop.
    pub(super) fn capture_verbatim(&mut self, raw: &str) -> Result<(), CompileError> {
        let Some(collector) = self.collectors.last_mut() else {
            return Err(CompileError::Internal("no body is being collected".to_string()));
        };
        let Some(capture) = &collector.capture else {
            return Err(CompileError::Internal("no verbatim block is being captured".to_string()));
        };
        let (depth, text) = self.indent.split_units(self.indent.dedent(raw, collector.base));
        let text = substitute_named(text, &capture.outer, self.env.current())?;
        let deferred = capture.deferred.clone();
        collector.method.add_verbatim(depth, &text, deferred);
        Ok(())
    }

    /// End the innermost body. A method is registered; a loop is unrolled
    /// into its enclosing body, or compiled right away at the top level.
    pub(super) fn close_collector(&mut self) -> Result<(), CompileError> {
        let Some(mut collector) = self.collectors.pop() else {
            return Ok(());
        };
        collector.method.set_unit(self.indent.unit());
        let name = collector.method.name.clone();

        let (level, values) = match collector.kind {
            CollectorKind::Definition => {
                log::debug!(
                    "method {}({}) defined with {} lines",
                    name,
                    collector.method.parameters.join(", "),
                    collector.method.body().len()
                );
                self.methods.insert(name, Rc::new(collector.method));
                return Ok(());
            }
            CollectorKind::Loop { level, values } => (level, values),
        };
        self.methods.insert(name.clone(), Rc::new(collector.method));

        if let Some(parent) = self.collectors.last_mut() {
            let depth = level.saturating_sub(parent.base);
            for value in &values {
                parent.method.add_line(depth, &format!("{}({})", name, value));
            }
            parent.nested.push(name);
            parent.nested.extend(collector.nested);
            return Ok(());
        }

        log::debug!("unrolling {} over {} values", name, values.len());
        let ws = self.indent.indent_to(level);
        for value in &values {
            self.handle_line(&format!("{}{}({})", ws, name, value))?;
        }
        self.methods.remove(&name);
        for nested in &collector.nested {
            self.methods.remove(nested);
        }
        Ok(())
    }

    /// Parameters and assigned variables of every body being collected.
    fn collector_locals(&self) -> Vec<String> {
        self.collectors
            .iter()
            .flat_map(|collector| collector.method.locals().cloned())
            .collect()
    }
}
