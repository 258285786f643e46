use pyml::line::{is_blank, is_comment};
use pyml::syntax::find_unquoted;

use crate::error::CompileError;
use crate::method::is_compound_assignment;
use crate::template_engine::{self, Declaration, find_calls};
use crate::verbatim::{self, VerbatimDefinition, opener_name};

use super::Parser;

/// What a logical line is, decided once before it is handled.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum LineKind {
    Skip,
    /// Inside the open verbatim block.
    VerbatimBody,
    /// First line after the open verbatim block.
    VerbatimEnd,
    /// A verbatim body line inside a method or loop being collected.
    CaptureVerbatim,
    EndCapture,
    /// Dedented out of the method or loop being collected.
    CloseCollector,
    Collect,
    VerbatimDeclaration(VerbatimDefinition),
    LoopHeader,
    MethodHeader,
    VerbatimOpen,
    Assignment,
    CompoundAssignment,
    Import,
    EngineDeclaration(Declaration),
    EngineCall,
    Markup,
}

impl Parser {
    /// Classify `raw` and measure its indent level. States are tested in
    /// priority order; the first match wins.
    pub(super) fn classify(&mut self, raw: &str) -> Result<(LineKind, usize), CompileError> {
        if let Some(open) = &self.verbatim {
            let level = self.indent.find_indent_lenient(raw);
            let kind = if open.contains(raw, level) {
                LineKind::VerbatimBody
            } else {
                LineKind::VerbatimEnd
            };
            return Ok((kind, level));
        }

        if let Some(capture) = self.collectors.last().and_then(|c| c.capture.as_ref()) {
            let capture_level = capture.level;
            let level = self.indent.find_indent_lenient(raw);
            let kind = if is_blank(raw) || level > capture_level {
                LineKind::CaptureVerbatim
            } else {
                LineKind::EndCapture
            };
            return Ok((kind, level));
        }

        if is_blank(raw) || is_comment(raw) {
            return Ok((LineKind::Skip, 0));
        }

        let level = self.indent.find_indent(raw)?;
        let text = raw.trim();

        if let Some(collector) = self.collectors.last() {
            let kind = if level < collector.base {
                LineKind::CloseCollector
            } else if is_loop_header(text) {
                LineKind::LoopHeader
            } else {
                LineKind::Collect
            };
            return Ok((kind, level));
        }

        if let Some(definition) = verbatim::parse_declaration(text)? {
            return Ok((LineKind::VerbatimDeclaration(definition), level));
        }
        if is_loop_header(text) {
            return Ok((LineKind::LoopHeader, level));
        }
        if text.starts_with("def ") {
            return Ok((LineKind::MethodHeader, level));
        }
        if self.verbatims.contains_key(opener_name(text)) {
            return Ok((LineKind::VerbatimOpen, level));
        }
        if find_unquoted(text, ":=").is_some() {
            return Ok((LineKind::Assignment, level));
        }
        if is_compound_assignment(text) {
            return Ok((LineKind::CompoundAssignment, level));
        }
        if text.starts_with("import ") {
            return Ok((LineKind::Import, level));
        }
        if let Some(declaration) = template_engine::parse_declaration(text)? {
            return Ok((LineKind::EngineDeclaration(declaration), level));
        }
        if !self.engines.is_empty() && !find_calls(text, &self.engines)?.is_empty() {
            return Ok((LineKind::EngineCall, level));
        }
        Ok((LineKind::Markup, level))
    }
}

fn is_loop_header(text: &str) -> bool {
    text.starts_with("for ") || text.starts_with("for\t")
}
