//! Project loading and phase ordering.
//!
//! A [`Project`] owns the ordered module list (the first loaded module is
//! the main module) and the per-module symbol tables, kept in a parallel
//! vector so the analyzer can borrow all tables at once while one module's
//! AST is checked. Loading resolves import paths, detects cycles through a
//! `loading` mark, and parses depth-first; analysis then runs the three
//! global phases, stopping at the first phase that reports an error.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::ast::Program;
use crate::errors::{Diagnostic, ErrorReporter, Level};
use crate::generics::InstantiationRegistry;
use crate::parse;
use crate::sema::Analyzer;
use crate::symtable::{ModuleId, Symbol, SymbolKind, SymbolTable};

/// One loaded module. The symbol table lives in [`Project::tables`] under
/// the same index.
#[derive(Debug)]
pub struct Module {
    /// Resolved (canonicalized where possible) path of the source file.
    pub path: PathBuf,
    /// Declared `module "name";` or the file stem.
    pub name: String,
    pub ast: Program,
    loading: bool,
}

#[derive(Debug)]
pub enum LoadError {
    Unresolved { import: String, from: String },
    Io { path: PathBuf },
    Parse,
    Cycle { path: PathBuf },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved { import, from } => {
                write!(f, "could not resolve module '{import}' relative to '{from}'")
            }
            Self::Io { path } => write!(f, "could not read file '{}'", path.display()),
            Self::Parse => write!(f, "parse failed"),
            Self::Cycle { path } => {
                write!(f, "circular dependency detected involving module '{}'", path.display())
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Resolves an import path: first relative to the importing file, then
/// relative to the working directory, then under `stdlib/`.
pub fn resolve_module_path(current_file: &Path, import_path: &str) -> Option<PathBuf> {
    let dir = current_file.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        let candidate = dir.join(import_path);
        if candidate.exists() {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }

    let candidate = PathBuf::from(import_path);
    if candidate.exists() {
        return Some(candidate.canonicalize().unwrap_or(candidate));
    }

    let candidate = Path::new("stdlib").join(import_path);
    if candidate.exists() {
        return Some(candidate.canonicalize().unwrap_or(candidate));
    }

    None
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map_or_else(|| path.to_owned(), |s| s.to_string_lossy().into_owned())
}

#[derive(Debug, Default)]
pub struct Project {
    pub modules: Vec<Module>,
    pub tables: Vec<SymbolTable>,
    pub strict_unsafe: bool,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main module is always the first loaded.
    pub fn main_module(&self) -> ModuleId {
        0
    }

    /// Loads the entry file and, recursively, everything it imports.
    pub fn load(
        &mut self,
        path: &str,
        reporter: &mut ErrorReporter,
    ) -> Result<ModuleId, LoadError> {
        self.load_module(path, Path::new("."), reporter)
    }

    fn load_module(
        &mut self,
        import_path: &str,
        relative_to: &Path,
        reporter: &mut ErrorReporter,
    ) -> Result<ModuleId, LoadError> {
        let resolved = resolve_module_path(relative_to, import_path).ok_or_else(|| LoadError::Unresolved {
            import: import_path.to_owned(),
            from: relative_to.display().to_string(),
        })?;

        if let Some(id) = self.modules.iter().position(|m| m.path == resolved) {
            if self.modules[id].loading {
                return Err(LoadError::Cycle {
                    path: self.modules[id].path.clone(),
                });
            }
            return Ok(id);
        }

        let source = std::fs::read_to_string(&resolved).map_err(|_| LoadError::Io {
            path: resolved.clone(),
        })?;

        let filename = resolved.display().to_string();
        let ast = parse::parse_source(&source, &filename, reporter).ok_or(LoadError::Parse)?;

        let id = self.insert_module(resolved.clone(), ast);
        self.modules[id].loading = true;

        let imports: Vec<String> = self.modules[id].ast.imports.iter().map(|i| i.path.clone()).collect();
        for import in imports {
            self.load_module(&import, &resolved, reporter)?;
        }

        self.modules[id].loading = false;
        Ok(id)
    }

    /// Registers an already-parsed module. Used by `load` and by tests that
    /// feed source text directly.
    pub fn insert_module(&mut self, path: PathBuf, ast: Program) -> ModuleId {
        let name = ast
            .module_name
            .clone()
            .unwrap_or_else(|| file_stem(&path.display().to_string()));
        self.tables.push(SymbolTable::new(Some(name.clone())));
        self.modules.push(Module {
            path,
            name,
            ast,
            loading: false,
        });
        self.modules.len() - 1
    }

    /// Builds a single-module project from source text (no filesystem).
    pub fn from_source(source: &str, filename: &str, reporter: &mut ErrorReporter) -> Option<Self> {
        let ast = parse::parse_source(source, filename, reporter)?;
        let mut project = Self::new();
        project.insert_module(PathBuf::from(filename), ast);
        Some(project)
    }

    /// Runs the three global analysis phases. Returns false (with
    /// diagnostics in the reporter) as soon as any phase fails.
    pub fn analyze(&mut self, reporter: &mut ErrorReporter) -> bool {
        let mut registry = InstantiationRegistry::default();

        // Phase A: declarations, module by module.
        for id in 0..self.modules.len() {
            let mut ast = std::mem::take(&mut self.modules[id].ast);
            let filename = self.modules[id].path.display().to_string();
            Analyzer::new(
                &mut self.tables,
                id,
                &filename,
                self.strict_unsafe,
                reporter,
                &mut registry,
            )
            .declare(&mut ast);
            self.modules[id].ast = ast;
            if reporter.has_errors() {
                return false;
            }
        }

        // Phase B: link imports.
        if !self.link_imports(reporter) {
            return false;
        }

        // Phase C: bodies.
        for id in 0..self.modules.len() {
            let mut ast = std::mem::take(&mut self.modules[id].ast);
            let filename = self.modules[id].path.display().to_string();
            Analyzer::new(
                &mut self.tables,
                id,
                &filename,
                self.strict_unsafe,
                reporter,
                &mut registry,
            )
            .analyze_bodies(&mut ast);
            self.modules[id].ast = ast;
            if reporter.has_errors() {
                return false;
            }
        }

        true
    }

    /// For each module and each of its imports, install a module-kind
    /// symbol in the importer's global scope pointing at the target module.
    /// The symbol's name is the alias if present, otherwise the import
    /// path's file stem (not the target's declared module name).
    fn link_imports(&mut self, reporter: &mut ErrorReporter) -> bool {
        for id in 0..self.modules.len() {
            let importer_path = self.modules[id].path.clone();
            let imports = self.modules[id].ast.imports.clone();
            for import in imports {
                let Some(resolved) = resolve_module_path(&importer_path, &import.path) else {
                    reporter.report(Diagnostic {
                        level: Level::Error,
                        code: None,
                        file: importer_path.display().to_string(),
                        line: 0,
                        column: 0,
                        message: format!("could not resolve import '{}'", import.path),
                        suggestion: None,
                        note: None,
                    });
                    return false;
                };
                let Some(target) = self.modules.iter().position(|m| m.path == resolved) else {
                    reporter.report(Diagnostic {
                        level: Level::Error,
                        code: None,
                        file: importer_path.display().to_string(),
                        line: 0,
                        column: 0,
                        message: format!("imported module '{}' not loaded in project", import.path),
                        suggestion: None,
                        note: None,
                    });
                    return false;
                };

                let alias = import.alias.clone().unwrap_or_else(|| file_stem(&import.path));
                let mut symbol = Symbol::new(alias, SymbolKind::Module, None, crate::ast::Loc::default());
                symbol.module_id = Some(target);
                // Duplicate aliases fall back to the first import, matching
                // first-wins insert semantics.
                let _ = self.tables[id].insert_global(symbol);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_strips_extension() {
        assert_eq!(file_stem("lib/math.vx"), "math");
        assert_eq!(file_stem("io.vx"), "io");
    }

    #[test]
    fn module_name_prefers_declaration_over_stem() {
        let mut reporter = ErrorReporter::quiet();
        let project =
            Project::from_source("module \"core\";\nfunc main() -> i32 { return 0; }", "app.vx", &mut reporter)
                .unwrap();
        assert_eq!(project.modules[0].name, "core");

        let project =
            Project::from_source("func main() -> i32 { return 0; }", "app.vx", &mut reporter).unwrap();
        assert_eq!(project.modules[0].name, "app");
    }
}
