use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::CompileError;

const HTML_COLORS: &str = include_str!("html_colors.txt");

static HTML: Lazy<ColorTable> = Lazy::new(|| ColorTable::parse(HTML_COLORS));

pub const MAX_COLOR: i64 = 0xffffff;

/// Named colors (lowercase name to six hex digits) and the conversions
/// between color literals and integers.
#[derive(Debug, Clone, Default)]
pub struct ColorTable {
    names: HashMap<String, String>,
}

impl ColorTable {
    /// Parse `name:rrggbb` lines.
    pub fn parse(source: &str) -> Self {
        let names = source
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(name, hex)| (name.trim().to_lowercase(), hex.trim().to_lowercase()))
            .collect();
        ColorTable { names }
    }

    /// The standard HTML color names.
    pub fn html() -> &'static ColorTable {
        &HTML
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_lowercase())
    }

    /// Integer value of a color name, or of hex digits with or without `#`.
    pub fn to_num(&self, color: &str) -> Result<i64, CompileError> {
        let lower = color.to_lowercase();
        let digits = match self.names.get(&lower) {
            Some(hex) => hex.clone(),
            None => {
                let hex = lower.strip_prefix('#').unwrap_or(&lower);
                if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(CompileError::InvalidColor(color.to_string()));
                }
                match hex.len() {
                    3 => hex.chars().flat_map(|c| [c, c]).collect(),
                    6 => hex.to_string(),
                    _ => return Err(CompileError::InvalidColor(color.to_string())),
                }
            }
        };
        i64::from_str_radix(&digits, 16).map_err(|_| CompileError::InvalidColor(color.to_string()))
    }

    /// `#rrggbb` for a number, clamped into the color range.
    pub fn to_color(&self, value: i64) -> String {
        format!("#{:06x}", value.clamp(0, MAX_COLOR))
    }
}
