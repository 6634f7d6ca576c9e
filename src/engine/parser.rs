//! Backtracking parse runtime.
//!
//! Each parser kind is a function from `(scope, input)` to either
//! `(output, remaining input)` or a [`ParseError`]. Scanners are immutable, so
//! backtracking is just retrying with the scanner an attempt started from.
//!
//! ## Cutpoints
//!
//! Every failure is created tagged with the cutpoint generation active in
//! its scope. A tagged failure is fatal for that generation.
//!
//! ```text
//! Seq          opens a generation (forced if a child is a cutpoint).
//!              Before the cutpoint is crossed, failures tagged with its own
//!              generation are re-tagged with the previous one.
//! Oneof/Quant  open a generation only if one is active. A failure tagged
//! Delim        with any other generation propagates at once; their own
//!              failure is tagged with the previous generation.
//! ```
//!
//! With no enclosing generation the previous one is `None`, so an untagged
//! failure at the top is ordinary and a tagged one is fatal.

use super::compiler::{DelimParser, ParserId, ParserKind, Program, SeqItem, Terminal};
use super::scope::{CutpointIds, Scope};
use crate::error::{ParseError, ParseErrorKind};
use crate::tree::{DELIM_TAG, Extra, Node, ONEOF_TAG, QUANT_TAG, SEQ_TAG, TreeElement, fold_delim};
use crate::{SepFlags, Scanner};
use std::cell::Cell;

type Step = Result<(TreeElement, Scanner), ParseError>;

const EXCERPT_CHARS: usize = 40;

/// Work counters for one parse call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    /// Parser nodes entered.
    pub attempts: u64,
    /// Failed attempts that were recovered from by trying something else.
    pub backtracks: u64,
}

/// State for a single parse call over a compiled program.
pub(crate) struct ParseContext<'p> {
    program: &'p Program,
    ids: CutpointIds,
    attempts: Cell<u64>,
    backtracks: Cell<u64>,
}

enum Pair {
    /// The separator did not match; the list ends before it.
    Missing,
    /// A separator and (unless elided) the term after it.
    Matched { sep: TreeElement, term: Option<TreeElement>, rest: Scanner },
}

/// True if `err` is fatal for a generation other than `own`.
fn is_not_my_fatal(err: &ParseError, own: Option<u32>) -> bool {
    err.cutpoint.is_some() && err.cutpoint != own
}

fn excerpt(input: &Scanner) -> String {
    let text = input.as_str();
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((i, _)) => format!("{:?}  ...", &text[..i]),
        None => format!("{text:?}"),
    }
}

impl<'p> ParseContext<'p> {
    pub(crate) fn new(program: &'p Program) -> Self {
        ParseContext { program, ids: CutpointIds::default(), attempts: Cell::new(0), backtracks: Cell::new(0) }
    }

    pub(crate) fn stats(&self) -> ParseStats {
        ParseStats { attempts: self.attempts.get(), backtracks: self.backtracks.get() }
    }

    fn backtracked(&self) {
        self.backtracks.set(self.backtracks.get() + 1);
    }

    pub(crate) fn parse(&self, id: ParserId, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        self.attempts.set(self.attempts.get() + 1);
        let node = self.program.node(id);
        let label = node.label.as_deref();
        let rule = label.unwrap_or(rule);
        match &node.kind {
            ParserKind::Terminal(t) => self.terminal(t, rule, scope, input),
            ParserKind::Call(target) => self.parse(*target, rule, scope, input),
            ParserKind::Cut(inner) => self.parse(*inner, rule, scope, input),
            ParserKind::Seq(items) => self.seq(items, label.unwrap_or(SEQ_TAG), label.is_some(), rule, scope, input),
            ParserKind::Oneof(alts) => self.oneof(alts, label.unwrap_or(ONEOF_TAG), rule, scope, input),
            ParserKind::Delim(d) => self.delim(d, label.unwrap_or(DELIM_TAG), rule, scope, input),
            ParserKind::Quant { term, min, max } => {
                self.quant(*term, *min, *max, label.unwrap_or(QUANT_TAG), rule, scope, input)
            }
            ParserKind::Backref { ident, default } => self.backref(ident, *default, scope, input),
            ParserKind::Unresolved(name) => Err(ParseError::new(
                rule,
                ParseErrorKind::Terminal,
                format!("rule {name:?} was never compiled"),
                input,
            )
            .tagged(scope.cutpoint())),
        }
    }

    fn terminal(&self, t: &Terminal, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        match input.eat_regex(&t.re) {
            Some(m) => {
                tracing::trace!(rule, offset = input.offset(), len = m.whole.len(), "matched {}", t.expect);
                Ok((m.output().into(), m.rest))
            }
            None => Err(ParseError::new(rule, ParseErrorKind::Terminal, format!("expect: {}", t.expect), input)
                .with_note(format!("actual: {}", excerpt(input)))
                .tagged(scope.cutpoint())),
        }
    }

    fn seq(&self, items: &[SeqItem], tag: &str, boundary: bool, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        let force = items.iter().any(|item| item.cut);
        let (mut scope, prev, own) = scope.replace_cutpoint(force, &self.ids);
        let mut crossed = false;
        let mut rest = input.clone();
        let mut children = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match self.parse(item.parser, rule, &scope, &rest) {
                Ok((value, next)) => {
                    if let Some(ident) = &item.bind {
                        scope = scope.with(ident, value.clone());
                    }
                    children.push(value);
                    rest = next;
                    crossed |= item.cut;
                }
                Err(mut err) => {
                    if !crossed && err.cutpoint == own {
                        err.cutpoint = prev;
                    }
                    if !boundary {
                        return Err(err);
                    }
                    let cutpoint = err.cutpoint;
                    return Err(ParseError::new(rule, ParseErrorKind::Sequence, format!("element {i} failed"), &rest)
                        .with_children(vec![err])
                        .tagged(cutpoint));
                }
            }
        }
        Ok((Node::new(tag, None, children).into(), rest))
    }

    fn oneof(&self, alts: &[ParserId], tag: &str, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        let (scope, prev, own) = scope.replace_cutpoint(false, &self.ids);
        let mut errors = Vec::with_capacity(alts.len());
        for (i, &alt) in alts.iter().enumerate() {
            match self.parse(alt, rule, &scope, input) {
                Ok((value, rest)) => {
                    tracing::trace!(rule, choice = i, "alternative matched");
                    return Ok((Node::new(tag, Some(Extra::Choice(i)), vec![value]).into(), rest));
                }
                Err(err) if is_not_my_fatal(&err, own) => return Err(err),
                Err(err) => {
                    self.backtracked();
                    errors.push(err);
                }
            }
        }
        let furthest = errors.iter().map(ParseError::furthest_offset).fold(input.offset(), usize::max);
        let mut err = ParseError::new(
            rule,
            ParseErrorKind::NoAlternative,
            "None of the available options could be satisfied",
            input,
        )
        .with_children(errors)
        .tagged(prev);
        err.offset = furthest;
        Err(err)
    }

    #[allow(clippy::too_many_arguments)]
    fn quant(&self, term: ParserId, min: usize, max: usize, tag: &str, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        let (scope, prev, own) = scope.replace_cutpoint(false, &self.ids);
        let mut reps = Vec::new();
        let mut rest = input.clone();
        let mut last_err = None;
        while max == 0 || reps.len() < max {
            match self.parse(term, rule, &scope, &rest) {
                Ok((value, next)) => {
                    if next.offset() == rest.offset() {
                        // A zero-width repetition matches the same way every time.
                        let count = reps.len().max(min.saturating_sub(1)) + 1;
                        reps.resize(count, value);
                        rest = next;
                        break;
                    }
                    reps.push(value);
                    rest = next;
                }
                Err(err) if is_not_my_fatal(&err, own) => return Err(err),
                Err(err) => {
                    self.backtracked();
                    last_err = Some(err);
                    break;
                }
            }
        }
        if reps.len() >= min {
            return Ok((Node::new(tag, None, reps).into(), rest));
        }
        Err(ParseError::new(
            rule,
            ParseErrorKind::TooFewRepetitions,
            format!("expected at least {min} repetitions, found {}", reps.len()),
            &rest,
        )
        .with_children(last_err.into_iter().collect())
        .tagged(prev))
    }

    fn delim(&self, d: &DelimParser, tag: &str, rule: &str, scope: &Scope, input: &Scanner) -> Step {
        let (scope, prev, own) = scope.replace_cutpoint(false, &self.ids);
        let mut slots = Vec::new();
        let mut rest = input.clone();

        match self.parse(d.term, rule, &scope, &rest) {
            Ok((value, next)) => {
                slots.push(value);
                rest = next;
            }
            Err(err) if is_not_my_fatal(&err, own) => return Err(err),
            Err(err) => {
                let leading = match d.flags.contains(SepFlags::LEADING) {
                    true => self.pair(d, rule, &scope, own, &rest, false)?,
                    false => Pair::Missing,
                };
                match leading {
                    Pair::Matched { sep, term: Some(term), rest: next } => {
                        self.backtracked();
                        slots.extend([TreeElement::Empty, sep, term]);
                        rest = next;
                    }
                    _ => {
                        return Err(ParseError::new(rule, ParseErrorKind::EmptyList, "no first list element", input)
                            .with_children(vec![err])
                            .tagged(prev));
                    }
                }
            }
        }

        let can_end = d.flags.contains(SepFlags::TRAILING);
        loop {
            match self.pair(d, rule, &scope, own, &rest, can_end)? {
                Pair::Matched { sep, term, rest: next } => {
                    let stalled = next.offset() == rest.offset();
                    let elided = term.is_none();
                    slots.extend([sep, term.unwrap_or(TreeElement::Empty)]);
                    rest = next;
                    if elided || stalled {
                        break;
                    }
                }
                Pair::Missing => {
                    self.backtracked();
                    break;
                }
            }
        }
        Ok((fold_delim(tag, d.assoc, slots), rest))
    }

    /// Parse one `sep term` pair of a delimited list.
    ///
    /// A cutpoint separator makes the pair a forced sequence: once the
    /// separator matched, a missing term is fatal unless `allow_elided`.
    fn pair(
        &self,
        d: &DelimParser,
        rule: &str,
        scope: &Scope,
        own: Option<u32>,
        input: &Scanner,
        allow_elided: bool,
    ) -> Result<Pair, ParseError> {
        let (scope, pair_prev, pair_own) = match d.cut_sep {
            true => scope.replace_cutpoint(true, &self.ids),
            false => (scope.clone(), own, own),
        };
        let (sep, after_sep) = match self.parse(d.sep, rule, &scope, input) {
            Ok(ok) => ok,
            Err(mut err) => {
                if err.cutpoint == pair_own {
                    err.cutpoint = pair_prev;
                }
                if is_not_my_fatal(&err, own) {
                    return Err(err);
                }
                return Ok(Pair::Missing);
            }
        };
        match self.parse(d.term, rule, &scope, &after_sep) {
            Ok((term, rest)) => Ok(Pair::Matched { sep, term: Some(term), rest }),
            Err(err) if d.cut_sep => match allow_elided && err.cutpoint == pair_own {
                true => Ok(Pair::Matched { sep, term: None, rest: after_sep }),
                false => Err(err),
            },
            Err(err) if is_not_my_fatal(&err, own) => Err(err),
            Err(_) if allow_elided => Ok(Pair::Matched { sep, term: None, rest: after_sep }),
            Err(_) => Ok(Pair::Missing),
        }
    }

    fn backref(&self, ident: &str, default: Option<ParserId>, scope: &Scope, input: &Scanner) -> Step {
        let rest = match scope.get(ident) {
            Some(bound) => {
                let mut rest = input.clone();
                for leaf in bound.scanners() {
                    match rest.eat_literal(leaf.as_str()) {
                        Some((_, next)) => rest = next,
                        None => {
                            return Err(ParseError::new(ident, ParseErrorKind::BackrefNotMatched, "Backref not matched", input)
                                .with_note(format!("expected: {:?}", bound.text()))
                                .with_note(format!("actual: {}", excerpt(input)))
                                .tagged(scope.cutpoint()));
                        }
                    }
                }
                rest
            }
            None => match default {
                Some(default) => self.parse(default, ident, scope, input)?.1,
                None => {
                    return Err(ParseError::new(ident, ParseErrorKind::BackrefNotFound, "Backref not found", input)
                        .tagged(scope.cutpoint()));
                }
            },
        };
        let matched = input.slice(0, rest.offset() - input.offset());
        Ok((matched.into(), rest))
    }
}
