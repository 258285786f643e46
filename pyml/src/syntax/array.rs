use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::SyntaxError;
use crate::syntax::{find_unquoted, split_arguments};

static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(-?\d+):(-?\d+)(?::(-?\d+))?\]").unwrap());

/// Rewrite every `[start:stop]` / `[start:stop:step]` into the literal list it
/// denotes. The stop bound is inclusive in the direction of the step, and
/// a range that would step past `i64` ends at its last representable value.
pub fn expand_ranges(text: &str) -> Result<String, SyntaxError> {
    let mut expanded = String::with_capacity(text.len());
    let mut last = 0;

    for caps in RANGE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let invalid = || SyntaxError::InvalidRange(whole.as_str().to_string());
        let bound = |caps: &Captures, group: usize| -> Result<Option<i64>, SyntaxError> {
            caps.get(group)
                .map(|m| m.as_str().parse::<i64>().map_err(|_| invalid()))
                .transpose()
        };

        let (Some(start), Some(stop)) = (bound(&caps, 1)?, bound(&caps, 2)?) else {
            continue;
        };
        let step = bound(&caps, 3)?.unwrap_or(1);
        if step == 0 {
            return Err(invalid());
        }

        let values: Vec<String> = range_values(start, stop, step)
            .iter()
            .map(|v| v.to_string())
            .collect();
        expanded.push_str(&text[last..whole.start()]);
        expanded.push('[');
        expanded.push_str(&values.join(","));
        expanded.push(']');
        last = whole.end();
    }

    expanded.push_str(&text[last..]);
    Ok(expanded)
}

pub fn range_values(start: i64, stop: i64, step: i64) -> Vec<i64> {
    let mut values = Vec::new();
    let mut value = start;
    if step > 0 {
        while value <= stop {
            values.push(value);
            let Some(next) = value.checked_add(step) else { break };
            value = next;
        }
    } else if step < 0 {
        while value >= stop {
            values.push(value);
            let Some(next) = value.checked_add(step) else { break };
            value = next;
        }
    }
    values
}

/// Replace each `[a, b, c][i]` with its i-th element until none remain.
/// Negative indices count from the end. Brackets inside quoted strings are
/// text.
pub fn resolve_indexing(text: &str) -> Result<String, SyntaxError> {
    let mut text = text.to_string();

    while let Some(join) = find_unquoted(&text, "][") {
        let open = array_start(&text, join).ok_or(SyntaxError::MalformedIndex)?;
        let index_start = join + 2;
        let index_end = text[index_start..]
            .find(']')
            .map(|offset| index_start + offset)
            .ok_or(SyntaxError::MalformedIndex)?;

        let raw_index = text[index_start..index_end].trim();
        let index: i64 = raw_index
            .parse()
            .map_err(|_| SyntaxError::InvalidIndex(raw_index.to_string()))?;

        let elements =
            split_arguments(&text[open + 1..join]).map_err(|_| SyntaxError::MalformedIndex)?;
        let position = if index < 0 { index + elements.len() as i64 } else { index };
        let element = usize::try_from(position)
            .ok()
            .and_then(|position| elements.get(position))
            .ok_or(SyntaxError::MalformedIndex)?
            .clone();

        text.replace_range(open..=index_end, &element);
    }

    Ok(text)
}

/// Offset of the `[` matching the `]` at `close`, scanning backwards past
/// quoted strings and nested brackets.
pub fn array_start(text: &str, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = close;

    while i > 0 {
        i -= 1;
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q && !(i > 0 && bytes[i - 1] == b'\\') {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b']' => depth += 1,
            b'[' if depth == 0 => return Some(i),
            b'[' => depth -= 1,
            _ => {}
        }
    }
    None
}
