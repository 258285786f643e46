use std::fmt;

/// Errors raised while reading the shape of a source or rule line.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxError {
    IncorrectIndentation,
    InconsistentIndentation { found: String, unit: String },
    InvalidIndex(String),
    MalformedIndex,
    InvalidRange(String),
    UnbalancedBrackets(String),
    MissingParenthesis(String),
    Rule { line: usize, message: String },
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::IncorrectIndentation => write!(
                f,
                "incorrect indentation: a line may be at most one level deeper than the previous one"
            ),
            SyntaxError::InconsistentIndentation { found, unit } => write!(
                f,
                "inconsistent indentation: {:?} is not a whole number of indentation units ({:?})",
                found, unit
            ),
            SyntaxError::InvalidIndex(index) => {
                write!(f, "invalid index '{}', index must be an integer", index)
            }
            SyntaxError::MalformedIndex => write!(f, "syntax error while trying to parse index"),
            SyntaxError::InvalidRange(range) => {
                write!(f, "invalid range '{}': step cannot be zero", range)
            }
            SyntaxError::UnbalancedBrackets(text) => {
                write!(f, "unbalanced brackets in '{}'", text)
            }
            SyntaxError::MissingParenthesis(text) => {
                write!(f, "missing closing parenthesis in '{}'", text)
            }
            SyntaxError::Rule { line, message } => {
                write!(f, "markup rules, line {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for SyntaxError {}
