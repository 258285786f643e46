/// A logical source line: one physical line, or several joined by trailing
/// backslashes.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalLine {
    /// 1-based number of the last physical line that contributed.
    pub number: usize,
    pub text: String,
}

/// Split `source` into logical lines. Continuation lines lose their leading
/// whitespace and are joined to the previous text with a single space.
pub fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for (index, raw) in source.lines().enumerate() {
        let raw = raw.trim_end_matches('\r');
        let number = index + 1;
        match (raw.strip_suffix('\\'), pending.as_mut()) {
            (Some(head), None) => pending = Some(head.to_string()),
            (Some(head), Some(buffer)) => {
                buffer.push(' ');
                buffer.push_str(head.trim_start());
            }
            (None, Some(buffer)) => {
                buffer.push(' ');
                buffer.push_str(raw.trim_start());
                lines.push(LogicalLine { number, text: std::mem::take(buffer) });
                pending = None;
            }
            (None, None) => lines.push(LogicalLine { number, text: raw.to_string() }),
        }
    }

    if let Some(text) = pending {
        lines.push(LogicalLine { number: source.lines().count(), text });
    }
    lines
}

pub fn leading_whitespace(line: &str) -> &str {
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}
