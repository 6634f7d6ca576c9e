//! Error types.
//!
//! ```text
//! Error
//!  ├─ Parse(ParseError)        backtrackable failure that reached the top
//!  ├─ Fatal(ParseError)        failure past a crossed cutpoint
//!  ├─ UnconsumedInput          the rule matched a prefix only
//!  ├─ UnknownRule              no such rule in the compiled grammar
//!  ├─ Grammar(GrammarError)    the grammar itself is ill-formed
//!  └─ Structural               invariant violations (bridge, unparse, stacks)
//! ```

use crate::{Scanner, TreeElement, scanner::DEFAULT_CONTEXT_LINES};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(ParseError),
    #[error("fatal {0}")]
    Fatal(ParseError),
    #[error("unconsumed input:{}", .residue.context(DEFAULT_CONTEXT_LINES))]
    UnconsumedInput { residue: Scanner, tree: TreeElement },
    #[error("unknown rule {0:?}")]
    UnknownRule(String),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

impl Error {
    /// The failure tree, for `Parse` and `Fatal`.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(err) | Error::Fatal(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

// --- Parse errors -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// A literal or regex did not match.
    Terminal,
    /// A child of a sequence failed.
    Sequence,
    /// Every alternative of a `Oneof` failed.
    NoAlternative,
    /// A quantifier matched fewer repetitions than its minimum.
    TooFewRepetitions,
    /// A delimited list could not match its first term.
    EmptyList,
    /// A backreference's bound value did not recur.
    BackrefNotMatched,
    /// A backreference named a value that was never bound and has no default.
    BackrefNotFound,
}

/// A failed parse, as a tree of the attempts that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub rule: String,
    pub kind: ParseErrorKind,
    pub message: String,
    /// Expected/actual excerpts.
    pub notes: Vec<String>,
    pub children: Vec<ParseError>,
    /// Input offset the failure was detected at; for `NoAlternative` the
    /// furthest offset any alternative reached.
    pub offset: usize,
    /// Cutpoint generation this failure is fatal for, if any.
    pub cutpoint: Option<u32>,
}

impl ParseError {
    pub fn new(rule: impl Into<String>, kind: ParseErrorKind, message: impl Into<String>, at: &Scanner) -> Self {
        ParseError {
            rule: rule.into(),
            kind,
            message: message.into(),
            notes: Vec::new(),
            children: Vec::new(),
            offset: at.offset(),
            cutpoint: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ParseError>) -> Self {
        self.children = children;
        self
    }

    pub(crate) fn tagged(mut self, cutpoint: Option<u32>) -> Self {
        self.cutpoint = cutpoint;
        self
    }

    /// The furthest offset reached by this failure or any nested one.
    pub fn furthest_offset(&self) -> usize {
        self.children.iter().map(ParseError::furthest_offset).fold(self.offset, usize::max)
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}rule({}) - {}", self.rule, self.message)?;
        for note in &self.notes {
            writeln!(f, "{indent}  | {note}")?;
        }
        self.children.iter().try_for_each(|child| child.write_tree(f, depth + 1))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "parse failed")?;
        self.write_tree(f, 1)
    }
}

impl std::error::Error for ParseError {}

// --- Grammar errors ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    DuplicatedRule,
    UnknownRule,
    InvalidRegex,
    NameClashesWithRule,
    MinMaxQuantError,
    MultipleTermsWithSameName,
    PossibleCycleDetected,
    InvalidWrapRE,
    InvalidLiteral,
    NestedStack,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    /// 1-indexed line/column in the grammar source, when known.
    pub position: Option<(usize, usize)>,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Violation { kind, message: message.into(), position: None }
    }

    pub fn at(mut self, position: (usize, usize)) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((line, col)) = self.position {
            write!(f, "{line}:{col}: ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One or more problems with a grammar definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct GrammarError {
    pub violations: Vec<Violation>,
}

impl GrammarError {
    pub fn single(violation: Violation) -> Self {
        GrammarError { violations: vec![violation] }
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid grammar")?;
        for v in &self.violations {
            write!(f, "\n  {v}")?;
        }
        Ok(())
    }
}

// --- Structural errors ------------------------------------------------------

/// An internal invariant was broken: a tree that does not fit its term, or a
/// grammar shape the engine cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("stack nested inside another stack (placeholder {placeholder:?})")]
    NestedStack { placeholder: String },
    #[error("stack outside a rule body")]
    MisplacedStack,
    #[error("stack layer name clashes with rule {rule:?}")]
    LayerNameClash { rule: String },
    #[error("field {field:?} assigned twice")]
    DuplicateField { field: String },
    #[error("field {field:?} missing or exhausted")]
    MissingField { field: String },
    #[error("field {field:?} left with unconsumed values")]
    UnconsumedField { field: String },
    #[error("expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("{what} count {count} outside {min}..={max}")]
    CountOutOfBounds { what: &'static str, count: usize, min: usize, max: String },
}

impl StructuralError {
    pub(crate) fn shape(expected: impl Into<String>, found: impl fmt::Display) -> Self {
        StructuralError::ShapeMismatch { expected: expected.into(), found: found.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_error_renders_as_tree() {
        let s = Scanner::new("abc");
        let err = ParseError::new("a", ParseErrorKind::NoAlternative, "None of the available options could be satisfied", &s)
            .with_children(vec![
                ParseError::new("a", ParseErrorKind::Terminal, "expected \"x\"", &s),
                ParseError::new("b", ParseErrorKind::Terminal, "expected \"y\"", &s.skip(2)).with_note("found \"c\""),
            ]);
        assert_eq!(
            err.to_string(),
            "parse failed\n  rule(a) - None of the available options could be satisfied\n    rule(a) - expected \"x\"\n    rule(b) - expected \"y\"\n      | found \"c\"\n"
        );
        assert_eq!(err.furthest_offset(), 2);
    }

    #[test]
    fn grammar_error_lists_violations() {
        let err = GrammarError {
            violations: vec![
                Violation::new(ViolationKind::UnknownRule, "rule \"b\" is not defined").at((1, 6)),
                Violation::new(ViolationKind::InvalidRegex, "bad regex"),
            ],
        };
        assert!(err.has(ViolationKind::InvalidRegex));
        assert!(!err.has(ViolationKind::PossibleCycleDetected));
        assert_eq!(
            err.to_string(),
            "invalid grammar\n  1:6: UnknownRule: rule \"b\" is not defined\n  InvalidRegex: bad regex"
        );
    }
}
