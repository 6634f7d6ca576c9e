extern crate self as parsnip;

use std::collections::BTreeMap;

#[macro_use]
mod macros;
mod api;
pub mod ast;
pub mod bootstrap;
mod engine;
mod error;
mod scanner;
mod term;
mod tree;

pub use api::{CompileOptions, ParseDetails, ParseResultVerbose, compile, compile_with, parse_verbose};
pub use engine::{Parsers, RunMetrics};
pub use error::{Error, GrammarError, ParseError, ParseErrorKind, StructuralError, Violation, ViolationKind};
pub use scanner::{DEFAULT_CONTEXT_LINES, MergeError, RegexMatch, Scanner};
pub use tree::{DelimShape, Extra, Node, TreeElement};

/// Name of the placeholder rule that refers to the next layer of a precedence stack.
pub const STACK_PLACEHOLDER: &str = "@";

/// Reserved rule configuring the wrapper regex put around every literal and regex.
pub const WRAP_RE: &str = ".wrapRE";

// --- Term algebra -----------------------------------------------------------

/// Fold direction of a delimited list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Assoc {
    /// `a:b`: keep the list flat.
    #[default]
    NonAssoc,
    /// `a:>b`: nest pairs walking left to right.
    LeftToRight,
    /// `a<:b`: nest pairs walking right to left.
    RightToLeft,
}

impl Assoc {
    /// The grammar-source operator for this associativity.
    pub fn op(self) -> &'static str {
        match self {
            Assoc::NonAssoc => ":",
            Assoc::LeftToRight => ":>",
            Assoc::RightToLeft => "<:",
        }
    }

    pub fn from_op(op: &str) -> Option<Assoc> {
        match op {
            ":" => Some(Assoc::NonAssoc),
            ":>" => Some(Assoc::LeftToRight),
            "<:" => Some(Assoc::RightToLeft),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Separator placement allowed by a [`Delim`] beyond the strict `t (s t)*` shape.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SepFlags: u8 {
        /// The list may begin with a separator (`a:,b`).
        const LEADING  = 1 << 0;
        /// The list may end with a separator (`a:b,`).
        const TRAILING = 1 << 1;
    }
}

/// A delimited list: `term (sep term)*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delim {
    pub term: Box<Term>,
    pub sep: Box<Term>,
    pub assoc: Assoc,
    pub flags: SepFlags,
}

impl Delim {
    pub fn can_start_with_sep(&self) -> bool {
        self.flags.contains(SepFlags::LEADING)
    }

    pub fn can_end_with_sep(&self) -> bool {
        self.flags.contains(SepFlags::TRAILING)
    }
}

/// Repetition; `max == 0` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quant {
    pub term: Box<Term>,
    pub min: usize,
    pub max: usize,
}

/// A capture name bound to a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub name: String,
    pub term: Box<Term>,
}

/// `%ident` or `%ident="default"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backref {
    pub ident: String,
    pub default: Option<Box<Term>>,
}

/// A term evaluated against local rules overlaid on the enclosing grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedGrammar {
    pub term: Box<Term>,
    pub grammar: Grammar,
}

/// A node of the grammar-definition algebra.
///
/// Terms are immutable values; compilation reads them and builds its own
/// lookup structures around them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Rule(String),
    Lit(String),
    Regex(String),
    Seq(Vec<Term>),
    Oneof(Vec<Term>),
    Delim(Delim),
    Quant(Quant),
    Named(Named),
    Stack(Vec<Term>),
    Backref(Backref),
    CutPoint(Box<Term>),
    ScopedGrammar(ScopedGrammar),
}

impl Term {
    pub fn rule(name: impl Into<String>) -> Term {
        Term::Rule(name.into())
    }

    pub fn lit(text: impl Into<String>) -> Term {
        Term::Lit(text.into())
    }

    pub fn re(pattern: impl Into<String>) -> Term {
        Term::Regex(pattern.into())
    }

    pub fn quant(term: Term, min: usize, max: usize) -> Term {
        Term::Quant(Quant { term: Box::new(term), min, max })
    }

    /// `term?`
    pub fn opt(term: Term) -> Term {
        Term::quant(term, 0, 1)
    }

    /// `term*`
    pub fn any(term: Term) -> Term {
        Term::quant(term, 0, 0)
    }

    /// `term+`
    pub fn some(term: Term) -> Term {
        Term::quant(term, 1, 0)
    }

    pub fn named(name: impl Into<String>, term: Term) -> Term {
        Term::Named(Named { name: name.into(), term: Box::new(term) })
    }

    pub fn delim(term: Term, sep: Term) -> Term {
        Term::delim_with(term, sep, Assoc::NonAssoc, SepFlags::empty())
    }

    pub fn delim_with(term: Term, sep: Term, assoc: Assoc, flags: SepFlags) -> Term {
        Term::Delim(Delim { term: Box::new(term), sep: Box::new(sep), assoc, flags })
    }

    pub fn backref(ident: impl Into<String>, default: Option<Term>) -> Term {
        Term::Backref(Backref { ident: ident.into(), default: default.map(Box::new) })
    }

    pub fn cut(term: Term) -> Term {
        Term::CutPoint(Box::new(term))
    }

    pub fn scoped(term: Term, grammar: Grammar) -> Term {
        Term::ScopedGrammar(ScopedGrammar { term: Box::new(term), grammar })
    }
}

// --- Grammar ----------------------------------------------------------------

/// Rule name → term. Iteration order is by rule name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grammar {
    rules: BTreeMap<String, Term>,
}

impl Grammar {
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Define (or redefine) `name`, returning the previous definition.
    pub fn insert(&mut self, name: impl Into<String>, term: Term) -> Option<Term> {
        self.rules.insert(name.into(), term)
    }

    /// Builder form of [`Grammar::insert`].
    pub fn with(mut self, name: impl Into<String>, term: Term) -> Self {
        self.insert(name, term);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Term> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.rules.iter().map(|(name, term)| (name.as_str(), term))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compile with default options (validation on, no automatic cutpoints).
    pub fn compile(&self) -> Result<Parsers, Error> {
        engine::compile_grammar(self, &CompileOptions::default())
    }

    pub fn compile_with(&self, options: &CompileOptions) -> Result<Parsers, Error> {
        engine::compile_grammar(self, options)
    }
}

impl FromIterator<(String, Term)> for Grammar {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Grammar { rules: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a Grammar {
    type Item = (&'a String, &'a Term);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Term>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
