//! Automatic cutpoint insertion.
//!
//! A literal that occurs exactly once in the whole grammar can only ever be
//! consumed by one path through it, so once it has matched no other
//! alternative could have succeeded on the same text. Such literals are
//! wrapped in `CutPoint`.
//!
//! A separator of a list that may start with a separator is counted twice,
//! so it never becomes a cutpoint.

use crate::{Grammar, Term, WRAP_RE};
use std::collections::{BTreeSet, HashMap};

fn count_literals(term: &Term, counts: &mut HashMap<String, usize>) {
    match term {
        Term::Lit(text) => *counts.entry(text.clone()).or_default() += 1,
        Term::Seq(ts) | Term::Oneof(ts) | Term::Stack(ts) => ts.iter().for_each(|t| count_literals(t, counts)),
        Term::Delim(d) => {
            count_literals(&d.term, counts);
            count_literals(&d.sep, counts);
            if d.can_start_with_sep() {
                count_literals(&d.sep, counts);
            }
        }
        Term::Quant(q) => count_literals(&q.term, counts),
        Term::Named(n) => count_literals(&n.term, counts),
        Term::CutPoint(t) => count_literals(t, counts),
        Term::Backref(b) => {
            if let Some(default) = &b.default {
                count_literals(default, counts);
            }
        }
        Term::ScopedGrammar(sg) => {
            count_literals(&sg.term, counts);
            // A scoped grammar contributes each of its own unique literals once.
            for lit in sg.grammar.unique_literals() {
                *counts.entry(lit).or_default() += 1;
            }
        }
        Term::Rule(_) | Term::Regex(_) => {}
    }
}

impl Grammar {
    /// Literals occurring exactly once in the grammar.
    pub fn unique_literals(&self) -> BTreeSet<String> {
        let mut counts = HashMap::new();
        for (_, term) in self.rules().filter(|(name, _)| *name != WRAP_RE) {
            count_literals(term, &mut counts);
        }
        counts.into_iter().filter(|(_, n)| *n == 1).map(|(lit, _)| lit).collect()
    }

    /// A copy of the grammar with every unique literal wrapped in a cutpoint.
    pub fn with_auto_cutpoints(&self) -> Grammar {
        let unique = self.unique_literals();
        tracing::debug!(count = unique.len(), "inserting automatic cutpoints");
        let mut out = Grammar::new();
        for (name, term) in self.rules() {
            if name == WRAP_RE {
                out.insert(name, term.clone());
                continue;
            }
            let rewritten = term.rewrite(&mut |t: Term| -> Result<Term, std::convert::Infallible> {
                Ok(match t {
                    Term::Lit(text) if unique.contains(&text) => Term::cut(Term::Lit(text)),
                    Term::CutPoint(inner) if matches!(inner.as_ref(), Term::CutPoint(_)) => *inner,
                    t => t,
                })
            });
            match rewritten {
                Ok(term) => out.insert(name, term),
                Err(never) => match never {},
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unique_literals_are_counted_across_rules() {
        let g = grammar! {
            "a" => seq![Term::lit("hello"), Term::lit("A"), Term::lit("b"), Term::lit("A")],
        };
        let expected: BTreeSet<String> = ["hello", "b"].into_iter().map(String::from).collect();
        assert_eq!(g.unique_literals(), expected);
    }

    #[test]
    fn leading_separators_never_become_cutpoints() {
        let g = grammar! {
            "a" => Term::delim_with(Term::re("x"), Term::lit(","), crate::Assoc::NonAssoc, crate::SepFlags::LEADING),
            "b" => Term::lit(";"),
        };
        let expected: BTreeSet<String> = [";"].into_iter().map(String::from).collect();
        assert_eq!(g.unique_literals(), expected);
    }

    #[test]
    fn scoped_grammars_count_their_own_literals_once() {
        let local = grammar! { "x" => seq![Term::lit("k"), Term::lit("k")], "y" => Term::lit("m") };
        let g = grammar! { "a" => seq![Term::lit("m"), Term::scoped(Term::rule("y"), local)] };
        assert!(g.unique_literals().is_empty());
    }

    #[test]
    fn unique_literals_are_wrapped() {
        let g = grammar! {
            "a" => seq![Term::lit("if"), Term::rule("b")],
            "b" => oneof![Term::lit("x"), Term::lit("x")],
        };
        let cut = g.with_auto_cutpoints();
        assert_eq!(cut.get("a"), Some(&seq![Term::cut(Term::lit("if")), Term::rule("b")]));
        assert_eq!(cut.get("b"), g.get("b"));
    }
}
