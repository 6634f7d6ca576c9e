//! Grammar compilation and parsing engine.
//!
//! This module is the entry point for turning a [`Grammar`] into [`Parsers`]
//! and running them. The work is split into focused submodules under
//! `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! Grammar ──┐
//!           │  with_auto_cutpoints        (cutpoints.rs, optional)
//!           │  term_violations            (validate.rs)
//!           │  eliminate_stacks           (term.rs)
//!           v
//!     compile_program                     (compiler.rs)
//!       - register rule slots
//!       - build parser arena, patch calls
//!           │
//!           │  cycle_violations           (validate.rs)
//!           v
//!       Parsers ── parse ──> ParseContext (parser.rs, scope.rs)
//!                              - backtracking per term kind
//!                              - cutpoint generations
//!                              - backref bindings
//!                                  │
//!                                  v
//!                             TreeElement ── unparse (unparse.rs) ──> text
//! ```
//!
//! ## Responsibilities by module
//!
//! - `compiler.rs`: the parser arena and the two-pass build that makes
//!   recursive rules plain indices.
//! - `parser.rs`: the runtime, one function per parser kind.
//! - `scope.rs`: persistent backref bindings and cutpoint generation ids.
//! - `validate.rs`: grammar checks, including left-recursion detection.
//! - `cutpoints.rs`: automatic cutpoints around unique literals.
//! - `unparse.rs`: the left inverse of parsing.
//! - `metrics.rs`: timings and counters for verbose runs.
//!
//! ## Debugging
//!
//! Set `RUST_LOG=parsnip=trace` (binary only) to see every term attempt.

#[path = "engine/compiler.rs"]
mod compiler;
#[path = "engine/cutpoints.rs"]
mod cutpoints;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/scope.rs"]
mod scope;
#[path = "engine/unparse.rs"]
mod unparse;
#[path = "engine/validate.rs"]
mod validate;

pub use metrics::RunMetrics;
pub(crate) use metrics::timed;

use crate::error::{Error, GrammarError};
use crate::term::RuleEnv;
use crate::{CompileOptions, Grammar, Scanner, Term, TreeElement, WRAP_RE, ast};
use compiler::Program;
use parser::{ParseContext, ParseStats};
use scope::Scope;

/// A compiled grammar.
///
/// Immutable once built; independent parses may share it freely.
#[derive(Debug, Clone)]
pub struct Parsers {
    grammar: Grammar,
    /// `grammar` with every precedence stack expanded into layer rules.
    flat: Grammar,
    program: Program,
}

pub(crate) fn compile_grammar(grammar: &Grammar, options: &CompileOptions) -> Result<Parsers, Error> {
    let grammar = match options.auto_cutpoints {
        true => grammar.with_auto_cutpoints(),
        false => grammar.clone(),
    };
    if options.validate {
        let violations = validate::term_violations(&grammar);
        if !violations.is_empty() {
            return Err(GrammarError { violations }.into());
        }
    }
    let flat = grammar.eliminate_stacks()?;
    let program = compiler::compile_program(&flat)?;
    if options.validate {
        let violations = validate::cycle_violations(&program);
        if !violations.is_empty() {
            return Err(GrammarError { violations }.into());
        }
    }
    Ok(Parsers { grammar, flat, program })
}

impl Grammar {
    /// Run every grammar check without keeping the compiled result.
    pub fn validate(&self) -> Result<(), Error> {
        compile_grammar(self, &CompileOptions::default()).map(|_| ())
    }
}

impl Parsers {
    /// The grammar as compiled (after automatic cutpoints, if enabled).
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The grammar with precedence stacks expanded into `rule@n` layers.
    pub fn flat_grammar(&self) -> &Grammar {
        &self.flat
    }

    /// Names of every parseable top-level rule, stack layers included.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.flat.names().filter(|name| *name != WRAP_RE)
    }

    pub fn rule(&self, name: &str) -> Option<&Term> {
        self.flat.get(name).filter(|_| name != WRAP_RE)
    }

    /// Parse the whole of `text` as `rule`.
    pub fn parse(&self, rule: &str, text: &str) -> Result<TreeElement, Error> {
        self.parse_scanner(rule, &Scanner::new(text))
    }

    /// Parse the whole of `input` as `rule`; trailing input is an error.
    pub fn parse_scanner(&self, rule: &str, input: &Scanner) -> Result<TreeElement, Error> {
        self.run(rule, input).0
    }

    /// Parse a prefix of `input` as `rule`, returning the tree and the rest.
    #[tracing::instrument(level = "trace", skip(self, input), fields(offset = input.offset()))]
    pub fn parse_partial(&self, rule: &str, input: &Scanner) -> Result<(TreeElement, Scanner), Error> {
        let id = *self.program.rules.get(rule).ok_or_else(|| Error::UnknownRule(rule.to_string()))?;
        self.partial_with(&ParseContext::new(&self.program), id, rule, input)
    }

    /// Full parse plus the work counters of the attempt.
    pub(crate) fn run(&self, rule: &str, input: &Scanner) -> (Result<TreeElement, Error>, ParseStats) {
        let Some(&id) = self.program.rules.get(rule) else {
            return (Err(Error::UnknownRule(rule.to_string())), ParseStats::default());
        };
        let ctx = ParseContext::new(&self.program);
        let result = self.partial_with(&ctx, id, rule, input).and_then(|(tree, rest)| match rest.is_empty() {
            true => Ok(tree),
            false => Err(Error::UnconsumedInput { residue: rest, tree }),
        });
        (result, ctx.stats())
    }

    fn partial_with(
        &self,
        ctx: &ParseContext<'_>,
        id: compiler::ParserId,
        rule: &str,
        input: &Scanner,
    ) -> Result<(TreeElement, Scanner), Error> {
        ctx.parse(id, rule, &Scope::default(), input).map_err(|err| {
            tracing::debug!(rule, offset = err.furthest_offset(), fatal = err.cutpoint.is_some(), "parse failed");
            match err.cutpoint {
                Some(_) => Error::Fatal(err),
                None => Error::Parse(err),
            }
        })
    }

    /// Write `tree`, a parse of `rule`, back out as text.
    pub fn unparse(&self, rule: &str, tree: &TreeElement) -> Result<String, Error> {
        let body = self.rule(rule).ok_or_else(|| Error::UnknownRule(rule.to_string()))?;
        let mut out = String::new();
        unparse::unparse(RuleEnv::new(&self.flat), body, tree, &mut out)?;
        Ok(out)
    }

    /// The generic AST of `tree`, a parse of `rule`.
    pub fn to_ast(&self, rule: &str, tree: &TreeElement) -> Result<ast::Branch, Error> {
        ast::from_flat_tree(&self.flat, rule, tree)
    }

    /// Rebuild the concrete tree a generic AST was taken from.
    pub fn from_ast(&self, branch: &ast::Branch) -> Result<TreeElement, Error> {
        ast::to_flat_tree(&self.flat, branch)
    }
}
