pub mod color;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod method;
pub mod options;
pub mod output;
pub mod parser;
pub mod template_engine;
pub mod verbatim;

use std::path::Path;

pub use error::{CompileError, DiagnosticError};
pub use options::CompilerOptions;
pub use parser::Parser;

/// Compile a source file to markup.
pub fn compile_file(path: &Path, options: CompilerOptions) -> Result<String, DiagnosticError> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let rules = options
        .load_rules(base_dir)
        .map_err(|error| DiagnosticError::unlocated(error, path))?;
    let mut parser = Parser::new(rules, options);
    parser.compile_file(path)?;
    Ok(parser.into_output())
}

/// Compile source text. Imports resolve against `base_dir`.
pub fn compile_str(
    source: &str,
    base_dir: &Path,
    options: CompilerOptions,
) -> Result<String, DiagnosticError> {
    let name = Path::new("<input>");
    let rules = options
        .load_rules(base_dir)
        .map_err(|error| DiagnosticError::unlocated(error, name))?;
    let mut parser = Parser::new(rules, options);
    parser.compile_source(source, name, base_dir)?;
    Ok(parser.into_output())
}
