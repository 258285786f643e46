use crate::error::SyntaxError;
use crate::line::leading_whitespace;

/// Depth bookkeeping for indentation-structured text.
///
/// The first indented line fixes the indentation unit for the rest of the
/// file. Every structural line's depth is its leading whitespace measured in
/// units, and a line may open at most one level deeper than the line before.
#[derive(Debug, Clone, Default)]
pub struct IndentTracker {
    unit: Option<String>,
    level: usize,
    /// No block has been opened yet, so dedents have nothing to close.
    opened: bool,
}

impl IndentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn has_opened(&self) -> bool {
        self.opened
    }

    /// Depth of a structural line. Whitespace that is not an exact repetition
    /// of the unit is rejected.
    pub fn find_indent(&mut self, line: &str) -> Result<usize, SyntaxError> {
        let ws = leading_whitespace(line);
        if ws.is_empty() || ws.len() == line.len() {
            return Ok(0);
        }
        let unit = self.unit.get_or_insert_with(|| ws.to_string());
        let count = ws.len() / unit.len();
        if count == 0 || unit.repeat(count) != ws {
            return Err(SyntaxError::InconsistentIndentation {
                found: ws.to_string(),
                unit: unit.clone(),
            });
        }
        Ok(count)
    }

    /// Depth of a passthrough line, rounded down.
    pub fn find_indent_lenient(&mut self, line: &str) -> usize {
        let ws = leading_whitespace(line);
        if ws.is_empty() || ws.len() == line.len() {
            return 0;
        }
        let unit = self.unit.get_or_insert_with(|| ws.to_string());
        ws.len() / unit.len()
    }

    /// Move to `level`. Returns how many open blocks the caller must close
    /// before it opens the block for this line.
    pub fn handle_indent(&mut self, level: usize) -> Result<usize, SyntaxError> {
        let closes = if level <= self.level {
            if self.opened { self.level - level + 1 } else { 0 }
        } else if level - self.level > 1 {
            return Err(SyntaxError::IncorrectIndentation);
        } else {
            0
        };
        self.opened = true;
        self.level = level;
        Ok(closes)
    }

    /// Fall back to `level` without opening anything, returning how many
    /// blocks deeper than it were open.
    pub fn retreat(&mut self, level: usize) -> usize {
        if level < self.level {
            let closes = self.level - level;
            self.level = level;
            closes
        } else {
            0
        }
    }

    /// Forget every open block, keeping the unit.
    pub fn reset(&mut self) {
        self.level = 0;
        self.opened = false;
    }

    pub fn indent_to(&self, level: usize) -> String {
        self.unit.as_deref().map(|u| u.repeat(level)).unwrap_or_default()
    }

    /// Take `unit` as the indentation unit unless one is already fixed.
    pub fn adopt_unit(&mut self, unit: &str) {
        if self.unit.is_none() && !unit.is_empty() {
            self.unit = Some(unit.to_string());
        }
    }

    /// Split whole units off the front of `line`: how many there were and
    /// what follows them.
    pub fn split_units<'a>(&self, line: &'a str) -> (usize, &'a str) {
        let Some(unit) = self.unit.as_deref() else {
            return (0, line);
        };
        let mut rest = line;
        let mut count = 0;
        while let Some(stripped) = rest.strip_prefix(unit) {
            rest = stripped;
            count += 1;
        }
        (count, rest)
    }

    /// Strip `levels` units worth of leading whitespace from `line`. Lines
    /// with less whitespace lose all of it.
    pub fn dedent<'a>(&self, line: &'a str, levels: usize) -> &'a str {
        let width = self.unit.as_deref().map_or(0, str::len) * levels;
        let ws = leading_whitespace(line).len();
        &line[ws.min(width)..]
    }
}
