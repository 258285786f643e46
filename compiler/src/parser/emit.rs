//! Handlers that write output: elements, text, macro calls, verbatim
//! blocks and template engine calls, plus the block-closing discipline they
//! share.

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pyml::syntax::{
    attribute_name, is_bare_name, is_identifier, is_variable, parse_definition, unquote, unquoted,
};
use pyml::{CloseKind, end_tag, start_tag};

use crate::error::CompileError;
use crate::evaluator::{evaluate_line, resolve, substitute_named};
use crate::method::{HeapPolicy, Method};
use crate::options::SOURCE_EXTENSION;
use crate::template_engine::{CallSite, Declaration, TemplateEngine, find_calls};
use crate::verbatim::{OpenVerbatim, opener_name, opener_variables};

use super::{Closing, Expansion, OpenedTag, Parser};

impl Parser {
    // ---- Blocks ----

    /// Close whatever the indentation of a new block at `level` ends, then
    /// remember what closes the new block.
    pub(super) fn open_block(&mut self, level: usize, closing: Closing) -> Result<(), CompileError> {
        let closes = self.indent.handle_indent(level)?;
        for _ in 0..closes {
            self.close_last_element()?;
        }
        self.elements.push(closing);
        Ok(())
    }

    pub(super) fn close_last_element(&mut self) -> Result<(), CompileError> {
        let Some(closing) = self.elements.pop() else {
            return Ok(());
        };
        let last = self.last_opened.take();

        match closing {
            Closing::Nothing => {}
            Closing::Element { name, text } => {
                let untouched = last.filter(|o| o.name == name && o.mark == self.output.len());
                match (untouched, self.rules.close_kind(&name)) {
                    (_, CloseKind::NeverSelfClose) => {}
                    (Some(opened), _) if opened.inline => {
                        self.output.replace_suffix("\n", &end_tag(&name))?;
                    }
                    (Some(_), CloseKind::Normal) => self.output.replace_suffix(">\n", " />\n")?,
                    _ => self.write(&text),
                }
            }
            Closing::Engine { engine, method, ws } => {
                let end = self
                    .engines
                    .get_mut(&engine)
                    .and_then(|e| e.end_method(&method, true));
                if let Some(end) = end {
                    self.write(&format!("{}{}\n", ws, end));
                }
            }
        }
        Ok(())
    }

    /// Close every open block and forget the indentation level.
    pub(super) fn close_all(&mut self) -> Result<(), CompileError> {
        while !self.elements.is_empty() {
            self.close_last_element()?;
        }
        self.indent.reset();
        Ok(())
    }

    fn write(&mut self, text: &str) {
        self.output.append(text);
    }

    // ---- Markup ----

    /// A quoted text line, a macro call or an element.
    pub(super) fn markup(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        let resolved = resolve(text, self.env.current(), &[])?;
        let line = evaluate_line(&resolved, self.colors)?;
        let tag = line.trim();
        let ws = self.indent.indent_to(level);

        if tag.starts_with(['"', '\'']) {
            let content = unquote(tag).unwrap_or(&tag[1..]);
            self.open_block(level, Closing::Nothing)?;
            self.last_opened = None;
            self.write(&format!("{}{}\n", ws, content));
            return Ok(());
        }

        let (name, attributes) = parse_definition(tag)?;
        if let Some(method) = self.methods.get(&name).cloned() {
            self.open_block(level, Closing::Nothing)?;
            self.last_opened = None;
            return self.invoke(&method, &attributes, level);
        }

        if !is_bare_name(&name) {
            return Err(CompileError::InvalidTag(name));
        }
        let rule = self
            .rules
            .lookup(&name)
            .ok_or_else(|| CompileError::InvalidTag(name.clone()))?;

        // Quoted positional arguments are the element's text.
        let (content, attributes): (Vec<String>, Vec<String>) = attributes
            .into_iter()
            .partition(|attribute| unquote(attribute).is_some());
        if let Some(bad) = attributes.iter().find(|a| !rule.allows(attribute_name(a))) {
            return Err(CompileError::InvalidAttribute {
                attribute: attribute_name(bad).to_string(),
                tag: name,
            });
        }

        self.open_block(
            level,
            Closing::Element {
                name: name.clone(),
                text: format!("{}{}", ws, end_tag(&name)),
            },
        )?;
        let mut start = format!("{}{}", ws, start_tag(&name, &attributes));
        if !content.is_empty() {
            let text: Vec<&str> = content.iter().filter_map(|c| unquote(c)).collect();
            start.pop();
            start.push_str(&text.join(" "));
            start.push('\n');
        }
        self.write(&start);
        self.last_opened = Some(OpenedTag {
            name,
            mark: self.output.len(),
            inline: !content.is_empty(),
        });
        Ok(())
    }

    /// Start expanding a macro at `level`. Its lines are dispatched once
    /// the current line is done.
    fn invoke(&mut self, method: &Rc<Method>, arguments: &[String], level: usize) -> Result<(), CompileError> {
        if self.expansions.len() >= self.options.max_depth {
            return Err(CompileError::RecursionLimit {
                method: method.name.clone(),
                depth: self.options.max_depth,
            });
        }

        let framed = method.policy == HeapPolicy::Copy;
        if framed {
            let mut heap = self.env.global().clone();
            method.bind(arguments, &mut heap)?;
            self.env.push_frame(heap);
        } else {
            method.bind(arguments, self.env.current_mut())?;
        }

        log::trace!("expanding {} at level {}", method.name, level);
        self.expansions.push(Expansion {
            method: Rc::clone(method),
            next: 0,
            level,
            framed,
        });
        Ok(())
    }

    // ---- Variables ----

    /// `$a := value`, or a chain `$a := $b := value`.
    pub(super) fn assign(&mut self, text: &str) -> Result<(), CompileError> {
        let mut targets = Vec::new();
        let mut start = 0;
        for (index, _) in unquoted(text) {
            if index >= start && text[index..].starts_with(":=") {
                targets.push(text[start..index].trim());
                start = index + 2;
            }
        }
        let value = text[start..].trim();

        if value.is_empty() {
            let target = targets.last().copied().unwrap_or(text);
            return Err(CompileError::MissingValue(target.to_string()));
        }
        if let Some(bad) = targets.iter().find(|t| !is_variable(t)) {
            return Err(CompileError::IllegalAssignment(bad.to_string()));
        }

        let value = resolve(value, self.env.current(), &[])?;
        let value = evaluate_line(&value, self.colors)?;
        let heap = self.env.current_mut();
        for target in targets {
            heap.set(target, value.as_str());
        }
        Ok(())
    }

    // ---- Verbatim ----

    pub(super) fn open_verbatim(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        let name = opener_name(text);
        let definition = self
            .verbatims
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::Internal(format!("verbatim block '{}' vanished", name)))?;
        let variables = opener_variables(text)?;
        if let Some(missing) = variables.iter().find(|v| !self.env.current().contains(v)) {
            return Err(CompileError::UndefinedVariable(missing.clone()));
        }

        self.open_block(level, Closing::Nothing)?;
        self.last_opened = None;
        self.verbatim = Some(OpenVerbatim::new(definition, level, variables));
        Ok(())
    }

    pub(super) fn verbatim_body(&mut self, raw: &str, _level: usize) -> Result<(), CompileError> {
        let Some(open) = self.verbatim.as_mut() else {
            return Err(CompileError::Internal("no verbatim block is open".to_string()));
        };
        let line = self.indent.dedent(raw, open.level + 1);
        let line = substitute_named(line, &open.variables, self.env.current())?;
        open.push(&line);
        Ok(())
    }

    pub(super) fn flush_verbatim(&mut self) -> Result<(), CompileError> {
        let Some(open) = self.verbatim.take() else {
            return Ok(());
        };
        let outer = self.indent.indent_to(open.level);
        let unit = self.indent.indent_to(1);
        log::debug!(
            "flushing verbatim block '{}' ({} lines)",
            open.definition.name,
            open.len()
        );
        let text = open.finish(&outer, &unit)?;
        self.write(&text);
        Ok(())
    }

    // ---- Imports ----

    /// `import a.b` compiles `a/b.pyml` into this parser, once per module.
    pub(super) fn import(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        if level != 0 {
            return Err(CompileError::MisplacedDefinition("import".to_string()));
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let ["import", module] = tokens.as_slice() else {
            return Err(CompileError::InvalidImport(text.to_string()));
        };
        if !module.split('.').all(is_identifier) {
            return Err(CompileError::InvalidImport(text.to_string()));
        }
        if !self.imported.insert(module.to_string()) {
            log::debug!("module {} already imported", module);
            return Ok(());
        }

        let relative = PathBuf::from(module.replace('.', "/")).with_extension(SOURCE_EXTENSION);
        let path = self
            .dirs
            .last()
            .cloned()
            .into_iter()
            .chain(self.options.search_dirs())
            .map(|dir| dir.join(&relative))
            .find(|path| path.is_file())
            .ok_or_else(|| CompileError::ModuleNotFound(module.to_string()))?;
        log::debug!("importing {} from {}", module, path.display());
        let source = fs::read_to_string(&path)?;

        self.close_all()?;
        let outer = mem::take(&mut self.indent);
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let result = self.compile_source(&source, &path, &base);
        self.indent = outer;
        self.indent.reset();
        result.map_err(|error| CompileError::InModule(Box::new(error)))
    }

    // ---- Template engines ----

    pub(super) fn declare(&mut self, declaration: Declaration) -> Result<(), CompileError> {
        match declaration {
            Declaration::Engine { name, format } => {
                log::debug!("template engine {} declared", name);
                let engine = TemplateEngine::new(name.as_str(), &format)?;
                self.engines.insert(name, engine);
            }
            Declaration::Create {
                engine,
                method,
                start,
                end,
            } => self
                .engine_mut(&engine)?
                .add_method(&method, &start, end.as_deref())?,
            Declaration::Append {
                engine,
                parent,
                method,
                start,
            } => self
                .engine_mut(&engine)?
                .enhance_method(&parent, &method, &start)?,
        }
        Ok(())
    }

    /// A line calling one or more template engine methods.
    pub(super) fn engine_call(&mut self, text: &str, level: usize) -> Result<(), CompileError> {
        let resolved = resolve(text, self.env.current(), &[])?;
        let line = resolved.trim();
        let calls = find_calls(line, &self.engines)?;
        let Some(first) = calls.first() else {
            return self.markup(line, level);
        };

        let rest = line[first.range.end..].trim();
        if calls.len() == 1 && first.range.start == 0 && (rest.is_empty() || rest == ":") {
            return self.block_call(first, level);
        }

        let mut spliced = line.to_string();
        for call in calls.iter().rev() {
            let engine = self.engine_mut(&call.engine)?;
            if engine.has_end(&call.method) || engine.is_any_submethod(&call.method) {
                return Err(CompileError::TemplateEngine(format!(
                    "{}.{} opens a block and cannot be called inline",
                    call.engine, call.method
                )));
            }
            let rendered = engine.call_method(&call.method, &call.arguments, None)?;
            spliced.replace_range(call.range.clone(), &quote(&rendered));
        }
        self.markup(&spliced, level)
    }

    /// A call that makes up a whole line and opens a block. A submethod at
    /// the indent of its parent's open call closes the parent's body but
    /// keeps the parent's end directive pending.
    fn block_call(&mut self, call: &CallSite, level: usize) -> Result<(), CompileError> {
        let ws = self.indent.indent_to(level);
        let engine = self.engine_mut(&call.engine)?;
        let submethod = engine.is_submethod(&call.method, level);
        let known = engine.has_method(&call.method);

        if submethod {
            let closes = self.indent.retreat(level);
            for _ in 0..closes {
                self.close_last_element()?;
            }
        } else {
            if !known {
                return Err(CompileError::TemplateEngine(format!(
                    "'{}' is not a method of TemplateEngine '{}'",
                    call.method, call.engine
                )));
            }
            self.open_block(
                level,
                Closing::Engine {
                    engine: call.engine.clone(),
                    method: call.method.clone(),
                    ws: ws.clone(),
                },
            )?;
        }
        self.last_opened = None;

        let rendered = self
            .engine_mut(&call.engine)?
            .call_method(&call.method, &call.arguments, Some(level))?;
        self.write(&format!("{}{}\n", ws, rendered));
        Ok(())
    }

    fn engine_mut(&mut self, name: &str) -> Result<&mut TemplateEngine, CompileError> {
        self.engines.get_mut(name).ok_or_else(|| {
            CompileError::TemplateEngine(format!("TemplateEngine '{}' used prior to declaration", name))
        })
    }
}

/// Wrap rendered engine output as a string literal.
fn quote(text: &str) -> String {
    if text.contains('"') && !text.contains('\'') {
        format!("'{}'", text)
    } else {
        format!("\"{}\"", text)
    }
}
