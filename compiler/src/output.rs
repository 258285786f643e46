use crate::error::CompileError;

/// The compiled text. Writes only ever append, except for the checked
/// suffix rewrite used to collapse an empty element into `<tag />`.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`, turning escaped `\$` into a literal `$`.
    pub fn append(&mut self, text: &str) {
        if text.contains("\\$") {
            self.text.push_str(&text.replace("\\$", "$"));
        } else {
            self.text.push_str(text);
        }
    }

    /// Replace the trailing `expected` with `replacement`. Fails when the
    /// buffer does not end with `expected`.
    pub fn replace_suffix(&mut self, expected: &str, replacement: &str) -> Result<(), CompileError> {
        if !self.text.ends_with(expected) {
            return Err(CompileError::Internal(format!(
                "output does not end with {:?}, cannot rewrite it to {:?}",
                expected, replacement
            )));
        }
        let start = self.text.len() - expected.len();
        self.text.replace_range(start.., replacement);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
