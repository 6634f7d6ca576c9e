//! Static field cardinality.
//!
//! For a rule body (or capture) term, count how often each field can occur
//! in one match, as an interval `{lo, hi}` where `hi = 2` stands for "more
//! than one". The walk carries a multiplier for the enclosing repetition:
//!
//! ```text
//! Lit, Regex        ""     += parent
//! Rule r            r      += parent          (stack layers share the base name)
//! Backref %x        x      += parent
//! Named n=t         n      += parent          (t gets its own counters)
//! Seq               children under parent, summed
//! Oneof             alternatives counted alone, unioned, times parent
//! Delim t:s         t under parent×{1,2}, s under parent×{0,2}
//! Quant t{m,n}      t under parent×{m,n}      (unbounded n counts as 2)
//! ```
//!
//! A field is One-class if its interval is `{1,1}` or `{0,1}`, otherwise
//! Many-class. The `@choice`, `@count` and `@delim` bookkeeping fields are
//! always Many-class.

use super::{CHOICE_TAG, COUNT_TAG, DELIM_TAG};
use crate::term::unlevel;
use crate::{Quant, Term};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Counter {
    lo: usize,
    hi: usize,
}

const MANY: usize = 2;

const ONE_ONE: Counter = Counter { lo: 1, hi: 1 };
const ZERO_OR_ONE: Counter = Counter { lo: 0, hi: 1 };
const ZERO_OR_MORE: Counter = Counter { lo: 0, hi: MANY };
const ONE_OR_MORE: Counter = Counter { lo: 1, hi: MANY };

impl Counter {
    fn new(lo: usize, hi: usize) -> Counter {
        Counter { lo, hi: hi.min(MANY) }
    }

    fn from_quant(q: &Quant) -> Counter {
        Counter::new(q.min, if q.max == 0 { MANY } else { q.max })
    }

    fn add(self, other: Counter) -> Counter {
        Counter::new(self.lo.saturating_add(other.lo), self.hi.saturating_add(other.hi))
    }

    fn mul(self, other: Counter) -> Counter {
        Counter::new(self.lo.saturating_mul(other.lo), self.hi.saturating_mul(other.hi))
    }

    fn union(self, other: Counter) -> Counter {
        Counter { lo: self.lo.min(other.lo), hi: self.hi.max(other.hi) }
    }

    pub(crate) fn is_one(self) -> bool {
        self == ONE_ONE || self == ZERO_OR_ONE
    }
}

/// Field name → cardinality for one term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    fields: BTreeMap<String, Counter>,
}

impl Counters {
    pub(crate) fn of(term: &Term) -> Counters {
        let mut counters = Counters::default();
        counters.walk(term, ONE_ONE);
        counters
    }

    /// True if `field` holds a single value. Unknown fields are Many-class.
    pub(crate) fn is_one(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|c| c.is_one())
    }

    pub(crate) fn many_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|(_, c)| !c.is_one()).map(|(name, _)| name.as_str())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, field: &str) -> Option<(usize, usize)> {
        self.fields.get(field).map(|c| (c.lo, c.hi))
    }

    fn count(&mut self, field: &str, c: Counter) {
        let slot = self.fields.entry(field.to_string()).or_default();
        *slot = slot.add(c);
    }

    fn walk(&mut self, term: &Term, parent: Counter) {
        match term {
            Term::Lit(_) | Term::Regex(_) => self.count("", parent),
            Term::Rule(name) => self.count(unlevel(name).0, parent),
            Term::Backref(b) => self.count(&b.ident, parent),
            Term::Named(n) => self.count(&n.name, parent),
            Term::Seq(terms) => terms.iter().for_each(|t| self.walk(t, parent)),
            Term::Oneof(terms) | Term::Stack(terms) => {
                self.count(CHOICE_TAG, ZERO_OR_MORE);
                let alts: Vec<Counters> = terms.iter().map(Counters::of).collect();
                let mut names: Vec<&String> = alts.iter().flat_map(|a| a.fields.keys()).collect();
                names.sort();
                names.dedup();
                for name in names {
                    let united = alts
                        .iter()
                        .map(|a| a.fields.get(name).copied().unwrap_or_default())
                        .reduce(Counter::union)
                        .unwrap_or_default();
                    self.count(name, parent.mul(united));
                }
            }
            Term::Delim(d) => {
                self.count(DELIM_TAG, ZERO_OR_MORE);
                self.walk(&d.term, parent.mul(ONE_OR_MORE));
                self.walk(&d.sep, parent.mul(ZERO_OR_MORE));
            }
            Term::Quant(q) => {
                self.count(COUNT_TAG, ZERO_OR_MORE);
                self.walk(&q.term, parent.mul(Counter::from_quant(q)));
            }
            Term::CutPoint(t) => self.walk(t, parent),
            Term::ScopedGrammar(sg) => self.walk(&sg.term, parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counters_follow_the_term_algebra() {
        let cases: Vec<(Term, Vec<(&str, Option<(usize, usize)>)>)> = vec![
            (Term::any(Term::lit("1")), vec![("", Some((0, 2)))]),
            (Term::opt(Term::lit("1")), vec![("", Some((0, 1)))]),
            (seq![Term::lit("1"), Term::lit("2")], vec![("", Some((2, 2)))]),
            (
                oneof![Term::rule("a"), seq![Term::rule("a"), Term::rule("b")]],
                vec![("a", Some((1, 1))), ("b", Some((0, 1)))],
            ),
            (Term::delim(Term::rule("x"), Term::lit(",")), vec![("x", Some((1, 2))), ("", Some((0, 2)))]),
            (seq![Term::rule("expr@1"), Term::rule("expr")], vec![("expr", Some((2, 2))), ("expr@1", None)]),
            (Term::named("n", Term::some(Term::lit("1"))), vec![("n", Some((1, 1))), ("", None)]),
            (Term::backref("x", Some(Term::lit("d"))), vec![("x", Some((1, 1))), ("", None)]),
            (Term::quant(Term::cut(Term::rule("a")), 2, 5), vec![("a", Some((2, 2)))]),
        ];
        for (term, expected) in cases {
            let counters = Counters::of(&term);
            for (field, want) in expected {
                assert_eq!(counters.get(field), want, "{term} field {field:?}");
            }
        }
    }

    #[test]
    fn bookkeeping_fields_are_many() {
        let counters = Counters::of(&seq![Term::opt(Term::rule("a")), oneof![Term::lit("a"), Term::rule("b")]]);
        let many: Vec<&str> = counters.many_fields().collect();
        assert_eq!(many, vec!["@choice", "@count"]);
        assert!(counters.is_one(""));
        assert!(counters.is_one("b"));
    }
}
