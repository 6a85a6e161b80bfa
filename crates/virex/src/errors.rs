//! Diagnostic reporting.
//!
//! The reporter is an explicit accumulator threaded through every phase
//! instead of a process-wide counter. Rendering follows the
//! `level[code]: message` / `--> file:line:col` / snippet / caret / help
//! layout; warnings and notes render but do not increment the error count,
//! so they never gate the pipeline.

use std::fmt::Write as _;

use strum::Display;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Level {
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "warning")]
    Warning,
    #[strum(serialize = "note")]
    Note,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<&'static str>,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub suggestion: Option<String>,
    pub note: Option<String>,
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Accumulates diagnostics across all compilation phases.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: usize,
    diagnostics: Vec<Diagnostic>,
    /// Emit to stderr as diagnostics arrive. Tests turn this off and
    /// inspect [`ErrorReporter::rendered`] instead.
    pub print: bool,
    /// ANSI colors in rendered output.
    pub color: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            errors: 0,
            diagnostics: Vec::new(),
            print: true,
            color: true,
        }
    }

    /// A silent reporter for tests and library embedding.
    pub fn quiet() -> Self {
        Self {
            print: false,
            color: false,
            ..Self::new()
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// All rendered diagnostics joined, for assertions on output shape.
    pub fn rendered(&self) -> String {
        self.diagnostics.iter().map(|d| self.render(d)).collect()
    }

    pub fn report(&mut self, diag: Diagnostic) {
        if diag.level == Level::Error {
            self.errors += 1;
        }
        if self.print {
            eprint!("{}", self.render(&diag));
        }
        self.diagnostics.push(diag);
    }

    fn paint(&self, color: &str) -> &str {
        if self.color { color } else { "" }
    }

    fn render(&self, diag: &Diagnostic) -> String {
        let level_color = match diag.level {
            Level::Error => self.paint(RED),
            Level::Warning => self.paint(YELLOW),
            Level::Note => self.paint(BLUE),
        };
        let mut out = String::new();

        let _ = write!(out, "{}{}{}", self.paint(BOLD), level_color, diag.level);
        if let Some(code) = diag.code {
            let _ = write!(out, "[{code}]");
        }
        let _ = writeln!(out, ": {}{}", diag.message, self.paint(RESET));
        let _ = writeln!(
            out,
            "  {}-->{} {}:{}:{}",
            self.paint(CYAN),
            self.paint(RESET),
            diag.file,
            diag.line,
            diag.column
        );

        if !diag.file.is_empty()
            && diag.line >= 1
            && let Ok(source) = std::fs::read_to_string(&diag.file)
            && let Some(text) = source.lines().nth(diag.line.saturating_sub(1))
        {
            let _ = writeln!(out, "{:5} | {}", diag.line, text);
            let pad = " ".repeat(diag.column.saturating_sub(1));
            let _ = writeln!(out, "      | {level_color}{pad}^~~~{}", self.paint(RESET));
        }

        if let Some(suggestion) = &diag.suggestion {
            let _ = writeln!(out, "  {}help:{} {suggestion}", self.paint(BLUE), self.paint(RESET));
        }
        if let Some(note) = &diag.note {
            let _ = writeln!(out, "  {}note:{} {note}", self.paint(BLUE), self.paint(RESET));
        }
        out.push('\n');
        out
    }
}

/// Edit distance between two names, for "did you mean" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Picks the closest candidate within edit distance 3, if any.
pub fn suggest_name<'a, I>(name: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|c| (levenshtein(name, c), c))
        .filter(|(d, _)| *d <= 3)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("count", "count"), 0);
    }

    #[test]
    fn suggestions_cap_at_distance_three() {
        let candidates = ["counter", "print", "main"];
        assert_eq!(suggest_name("countr", candidates), Some("counter"));
        assert_eq!(suggest_name("zzzzzz", candidates), None);
    }

    #[test]
    fn warnings_do_not_count() {
        let mut reporter = ErrorReporter::quiet();
        reporter.report(Diagnostic {
            level: Level::Warning,
            code: None,
            file: String::new(),
            line: 1,
            column: 1,
            message: "unnecessary unsafe block".to_owned(),
            suggestion: None,
            note: None,
        });
        assert_eq!(reporter.error_count(), 0);

        reporter.report(Diagnostic {
            level: Level::Error,
            code: Some("E0002"),
            file: String::new(),
            line: 2,
            column: 5,
            message: "undefined variable 'x'".to_owned(),
            suggestion: None,
            note: None,
        });
        assert_eq!(reporter.error_count(), 1);
        let rendered = reporter.rendered();
        assert!(rendered.contains("error[E0002]: undefined variable 'x'"));
        assert!(rendered.contains("--> :2:5"));
    }
}
