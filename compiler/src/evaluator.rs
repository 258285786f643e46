//! Variable substitution and compile-time arithmetic on line fragments.
//!
//! Values are plain text until a fragment contains an arithmetic operator
//! outside quotes. Such a fragment is tokenized and, when every token is a
//! number, a string, a color literal, an operator or a parenthesis, it is
//! evaluated with a small Pratt parser. Fragments containing anything else
//! (bare words, ids like `#main-box`) are left untouched.

use pyml::syntax::{
    self, expand_ranges, find_unquoted, has_unquoted_operator, is_bare_name, is_call_shaped,
    normalize_attribute, parse_definition, resolve_indexing,
};

use crate::color::ColorTable;
use crate::environment::Heap;
use crate::error::CompileError;

// ---- Substitution ----

/// Replace every unescaped `$name` for which `lookup` yields a value.
/// Names the lookup declines are kept as written.
pub fn substitute_with<F>(text: &str, mut lookup: F) -> Result<String, CompileError>
where
    F: FnMut(&str) -> Result<Option<String>, CompileError>,
{
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(dollar) = rest.find('$') {
        let escaped = rest[..dollar].ends_with('\\');
        result.push_str(&rest[..dollar]);

        let after = &rest[dollar + 1..];
        let length = identifier_length(after);
        if escaped || length == 0 {
            result.push('$');
            rest = after;
            continue;
        }

        let name = &rest[dollar..dollar + 1 + length];
        match lookup(name)? {
            Some(value) => result.push_str(&value),
            None => result.push_str(name),
        }
        rest = &after[length..];
    }

    result.push_str(rest);
    Ok(result)
}

fn identifier_length(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(text.len(), |(index, _)| index)
}

/// Substitute every variable from `heap`. Names in `ignore` are left in
/// place; any other unknown name is an error.
pub fn substitute_variables(
    text: &str,
    heap: &Heap,
    ignore: &[String],
) -> Result<String, CompileError> {
    substitute_with(text, |name| {
        if ignore.iter().any(|ignored| ignored == name) {
            return Ok(None);
        }
        heap.get(name)
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))
    })
}

/// Substitute only the variables listed in `names`.
pub fn substitute_named(text: &str, names: &[String], heap: &Heap) -> Result<String, CompileError> {
    substitute_with(text, |name| {
        if !names.iter().any(|n| n == name) {
            return Ok(None);
        }
        heap.get(name)
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))
    })
}

/// Variable substitution followed by range expansion and index resolution.
pub fn resolve(text: &str, heap: &Heap, ignore: &[String]) -> Result<String, CompileError> {
    let text = substitute_variables(text, heap, ignore)?;
    let text = expand_ranges(&text)?;
    Ok(resolve_indexing(&text)?)
}

// ---- Line evaluation ----

/// Evaluate the arithmetic in a resolved line. Call-shaped lines are
/// evaluated attribute by attribute; bare names are never touched.
pub fn evaluate_line(line: &str, colors: &ColorTable) -> Result<String, CompileError> {
    let body = line.trim_start();
    let ws = &line[..line.len() - body.len()];
    let body = body.trim_end();

    if body.is_empty() || is_bare_name(body) {
        return Ok(line.to_string());
    }

    if is_call_shaped(body) {
        let block = body.ends_with(':');
        let (name, attributes) = parse_definition(body)?;
        let evaluated = attributes
            .iter()
            .map(|attribute| evaluate_fragment(attribute, colors))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(format!(
            "{}{}({}){}",
            ws,
            name,
            evaluated.join(","),
            if block { ":" } else { "" }
        ));
    }

    Ok(format!("{}{}", ws, evaluate_fragment(body, colors)?))
}

/// Evaluate one fragment: a whole value or a `name=value` attribute.
pub fn evaluate_fragment(fragment: &str, colors: &ColorTable) -> Result<String, CompileError> {
    if !has_unquoted_operator(fragment) {
        return Ok(fragment.to_string());
    }

    if let Some(eq) = find_unquoted(fragment, "=") {
        let name = fragment[..eq].trim();
        if is_attribute_name(name) {
            let value = evaluate_fragment(fragment[eq + 1..].trim(), colors)?;
            return Ok(normalize_attribute(&format!("{}={}", name, value)));
        }
    }

    let Some(tokens) = tokenize(fragment, colors)? else {
        return Ok(fragment.to_string());
    };
    let mut parser = ArithmeticParser::new(tokens, fragment);
    let value = parser.parse_expr(0)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    parser.render(value, colors)
}

fn is_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
        && !syntax::is_number(name)
}

// ---- Tokens ----

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Color(i64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

/// `None` when the fragment is not arithmetic at all.
fn tokenize(text: &str, colors: &ColorTable) -> Result<Option<Vec<Token>>, CompileError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i].is_ascii_alphabetic() || chars[i] == '_') {
                    return Ok(None);
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(number_token(&literal, text)?);
                continue;
            }
            '#' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let hex = digits.chars().all(|c| c.is_ascii_hexdigit());
                if !hex || !matches!(digits.len(), 3 | 6) {
                    return Ok(None);
                }
                tokens.push(Token::Color(colors.to_num(&digits)?));
                continue;
            }
            '"' | '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Ok(None),
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&q) if q == c => break,
                        Some(&other) => {
                            value.push(other);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push(string_token(value, colors)?);
                continue;
            }
            _ => return Ok(None),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(Some(tokens))
}

fn number_token(literal: &str, expression: &str) -> Result<Token, CompileError> {
    let invalid = || CompileError::InvalidMath {
        expression: expression.to_string(),
        reason: format!("'{}' is not a number", literal),
    };
    if literal.contains('.') {
        literal.parse().map(Token::Float).map_err(|_| invalid())
    } else {
        literal.parse().map(Token::Int).map_err(|_| invalid())
    }
}

/// Quoted color names and quoted hex literals are colors; other quoted
/// text is a string.
fn string_token(value: String, colors: &ColorTable) -> Result<Token, CompileError> {
    if colors.is_named(&value) {
        return Ok(Token::Color(colors.to_num(&value)?));
    }
    if let Some(hex) = value.strip_prefix('#') {
        if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Token::Color(colors.to_num(hex)?));
        }
    }
    Ok(Token::Str(value))
}

// ---- Pratt parser ----

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

// Left bp, right bp. All operators are left-associative.
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // -

struct ArithmeticParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    expression: &'a str,
    saw_color: bool,
}

impl<'a> ArithmeticParser<'a> {
    fn new(tokens: Vec<Token>, expression: &'a str) -> Self {
        ArithmeticParser {
            tokens,
            pos: 0,
            expression,
            saw_color: false,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidMath {
            expression: self.expression.trim().to_string(),
            reason: reason.into(),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Value, CompileError> {
        let mut left = self.parse_prefix()?;

        while let Some((operator, l_bp, r_bp)) = self.peek().and_then(infix_bp) {
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let right = self.parse_expr(r_bp)?;
            left = self.apply(operator, left, right)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Value, CompileError> {
        let token = self
            .advance()
            .ok_or_else(|| self.error("unexpected end of expression"))?;

        match token {
            Token::Int(n) => Ok(Value::Int(n)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Color(n) => {
                self.saw_color = true;
                Ok(Value::Int(n))
            }
            Token::Minus => match self.parse_expr(BP_UNARY)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Str(_) => Err(self.error("cannot negate a string")),
            },
            Token::Plus => self.parse_expr(BP_UNARY),
            Token::LParen => {
                let value = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(self.error("expected ')'")),
                }
            }
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }

    fn apply(&self, operator: Operator, left: Value, right: Value) -> Result<Value, CompileError> {
        use Value::{Float, Int, Str};

        let overflow = || self.error("integer overflow");
        match (left, right) {
            (Str(a), Str(b)) => match operator {
                Operator::Add => Ok(Str(a + &b)),
                _ => Err(self.error("strings only support '+'")),
            },
            (Str(_), _) | (_, Str(_)) => Err(self.error("cannot combine a string with a number")),
            (Int(a), Int(b)) => match operator {
                Operator::Add => a.checked_add(b).map(Int).ok_or_else(overflow),
                Operator::Subtract => a.checked_sub(b).map(Int).ok_or_else(overflow),
                Operator::Multiply => a.checked_mul(b).map(Int).ok_or_else(overflow),
                Operator::Divide | Operator::Modulo if b == 0 => Err(self.error("division by zero")),
                Operator::Divide => match a.checked_rem(b) {
                    Some(0) => a.checked_div(b).map(Int).ok_or_else(overflow),
                    Some(_) => Ok(Float(a as f64 / b as f64)),
                    None => Err(overflow()),
                },
                // The result takes the sign of the divisor.
                Operator::Modulo => match a.checked_rem(b).ok_or_else(overflow)? {
                    r if r != 0 && (r < 0) != (b < 0) => Ok(Int(r + b)),
                    r => Ok(Int(r)),
                },
            },
            (a, b) => {
                let (a, b) = (as_float(&a), as_float(&b));
                match operator {
                    Operator::Add => Ok(Float(a + b)),
                    Operator::Subtract => Ok(Float(a - b)),
                    Operator::Multiply => Ok(Float(a * b)),
                    Operator::Divide | Operator::Modulo if b == 0.0 => {
                        Err(self.error("division by zero"))
                    }
                    Operator::Divide => Ok(Float(a / b)),
                    Operator::Modulo => Ok(Float(a - b * (a / b).floor())),
                }
            }
        }
    }

    fn render(&self, value: Value, colors: &ColorTable) -> Result<String, CompileError> {
        if self.saw_color {
            let number = match value {
                Value::Int(n) => n,
                Value::Float(f) => f.trunc() as i64,
                Value::Str(_) => return Err(self.error("color arithmetic produced a string")),
            };
            return Ok(colors.to_color(number));
        }
        Ok(match value {
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        })
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        Value::Str(_) => f64::NAN,
    }
}

/// Infix binding powers: (operator, left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(Operator, u8, u8)> {
    match token {
        Token::Plus => Some((Operator::Add, BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Minus => Some((Operator::Subtract, BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star => Some((Operator::Multiply, BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)),
        Token::Slash => Some((Operator::Divide, BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)),
        Token::Percent => Some((Operator::Modulo, BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)),
        _ => None,
    }
}
