use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use pyml::MarkupRules;

use crate::error::CompileError;

/// Name of the optional options file looked up next to the input.
pub const FILE_NAME: &str = "pyml.toml";

/// Extension of source files and imported modules.
pub const SOURCE_EXTENSION: &str = "pyml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerOptions {
    /// Rule set name, or path to a rule file.
    pub markup: String,
    /// Directories searched for imports after the importing file's own.
    pub library_dirs: Vec<PathBuf>,
    /// Maximum number of nested macro invocations.
    pub max_depth: usize,
    pub output_extension: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            markup: "html".to_string(),
            library_dirs: Vec::new(),
            max_depth: 256,
            output_extension: "html".to_string(),
        }
    }
}

impl CompilerOptions {
    pub fn from_toml(text: &str) -> Result<Self, CompileError> {
        toml::from_str(text).map_err(|e| CompileError::Io(format!("invalid {}: {}", FILE_NAME, e)))
    }

    /// Options from `dir/pyml.toml`, or the defaults when there is none.
    pub fn load(dir: &Path) -> Result<Self, CompileError> {
        let path = dir.join(FILE_NAME);
        if !path.is_file() {
            return Ok(CompilerOptions::default());
        }
        log::debug!("reading options from {}", path.display());
        let text = fs::read_to_string(&path)?;
        let mut options = CompilerOptions::from_toml(&text)?;
        for library in &mut options.library_dirs {
            if library.is_relative() {
                *library = dir.join(&*library);
            }
        }
        Ok(options)
    }

    /// Fallback directories for imports and rule files: `lib/` next to the
    /// executable, then the configured library directories.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let installed = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("lib")));
        installed
            .into_iter()
            .chain(self.library_dirs.iter().cloned())
            .collect()
    }

    /// Load the configured rule set. `markup` is tried as a path relative to
    /// `base_dir`, then as a name under `<dir>/markup/` for every search
    /// directory, then as a built-in rule set.
    pub fn load_rules(&self, base_dir: &Path) -> Result<MarkupRules, CompileError> {
        let direct = base_dir.join(&self.markup);
        let candidates = std::iter::once(direct).chain(
            self.search_dirs()
                .into_iter()
                .map(|dir| dir.join("markup").join(&self.markup)),
        );
        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("loading markup rules from {}", candidate.display());
                let text = fs::read_to_string(&candidate)?;
                return Ok(MarkupRules::parse(&text)?);
            }
        }

        MarkupRules::builtin(&self.markup)
            .cloned()
            .ok_or_else(|| CompileError::Io(format!("markup rules '{}' not found", self.markup)))
    }
}
