//! Virex: a small statically-typed systems language that compiles to
//! portable C.
//!
//! The pipeline is linear and batch-shaped: the project loader parses the
//! entry file and everything it imports, the semantic analyzer runs three
//! global phases (declarations, import linking, bodies), and the emitter
//! lowers each module through the three-address IR and the optimizer into
//! one C translation unit that a host C compiler links against the bundled
//! runtime.
//!
//! The CLI lives in the `virex-cli` crate; this crate exposes the pieces
//! plus two convenience entry points, [`compile_source_to_c`] for
//! in-memory single-module builds (used heavily by the test suite) and
//! [`compile_file_to_c`] for on-disk projects with imports.

pub mod ast;
pub mod cgen;
pub mod ctype;
pub mod errors;
pub mod generics;
pub mod ir;
pub mod lexer;
pub mod loops;
pub mod mangle;
pub mod parse;
pub mod project;
pub mod sema;
pub mod symtable;
pub mod token;
pub mod types;

pub use crate::errors::{Diagnostic, ErrorReporter, Level};
pub use crate::project::{LoadError, Project};
pub use crate::types::{Prim, Type};

/// The C runtime linked into every produced executable.
pub const RUNTIME_C: &str = include_str!("../runtime/virex_runtime.c");

/// Why a whole-project build stopped.
#[derive(Debug)]
pub enum BuildError {
    Load(LoadError),
    /// Semantic analysis reported errors; details are in the reporter.
    Analysis,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "{err}"),
            Self::Analysis => write!(f, "analysis failed"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<LoadError> for BuildError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

/// Compiles a single in-memory module to C text. Returns `None` (with
/// diagnostics accumulated in `reporter`) when any phase fails.
pub fn compile_source_to_c(
    source: &str,
    filename: &str,
    strict_unsafe: bool,
    reporter: &mut ErrorReporter,
) -> Option<String> {
    let mut project = Project::from_source(source, filename, reporter)?;
    project.strict_unsafe = strict_unsafe;
    if !project.analyze(reporter) {
        return None;
    }
    Some(cgen::emit_project(&project))
}

/// Loads, analyzes, and emits a project rooted at `path`.
pub fn compile_file_to_c(
    path: &str,
    strict_unsafe: bool,
    reporter: &mut ErrorReporter,
) -> Result<String, BuildError> {
    let project = analyze_file(path, strict_unsafe, reporter)?;
    Ok(cgen::emit_project(&project))
}

/// Loads and analyzes a project, returning it for IR inspection
/// (`--emit-ir`).
pub fn analyze_file(
    path: &str,
    strict_unsafe: bool,
    reporter: &mut ErrorReporter,
) -> Result<Project, BuildError> {
    let mut project = Project::new();
    project.strict_unsafe = strict_unsafe;
    project.load(path, reporter)?;
    if !project.analyze(reporter) {
        return Err(BuildError::Analysis);
    }
    Ok(project)
}
