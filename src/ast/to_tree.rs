//! Generic tree → concrete tree.
//!
//! The inverse walk: the term drives, and each term pulls its values from
//! the fields it wrote them to, in the same order. Bookkeeping fields say
//! which alternative, how many repetitions and which list shape to rebuild.
//! A branch with values left over after its term is rebuilt is rejected.

use super::{Branch, CHOICE_TAG, COUNT_TAG, Counters, DELIM_TAG, Extra, Node, RULE_TAG};
use crate::error::{Error, StructuralError};
use crate::term::{RuleEnv, unlevel};
use crate::tree::{self, ONEOF_TAG, QUANT_TAG, SEQ_TAG, fold_delim};
use crate::{Grammar, Term, TreeElement, WRAP_RE};

pub(crate) fn to_flat_tree(grammar: &Grammar, branch: &Branch) -> Result<TreeElement, Error> {
    let env = RuleEnv::new(grammar);
    let mut root = branch.clone();
    let rule = match root.pull(RULE_TAG, true)? {
        Node::Extra(Extra::Rule(rule)) => rule,
        other => return Err(StructuralError::shape("a rule name", other).into()),
    };
    let (body, _) = env.get(&rule).filter(|_| rule != WRAP_RE).ok_or_else(|| Error::UnknownRule(rule.clone()))?;
    unnest(env, body, Some(&rule), root)
}

fn unnest(env: RuleEnv<'_>, term: &Term, label: Option<&str>, mut branch: Branch) -> Result<TreeElement, Error> {
    let counters = Counters::of(term);
    let rebuilt = rebuild(&mut branch, env, term, label, &counters)?;
    branch.ensure_consumed()?;
    Ok(rebuilt)
}

fn pull_leaf(branch: &mut Branch, field: &str, counters: &Counters) -> Result<TreeElement, StructuralError> {
    match branch.pull(field, counters.is_one(field))? {
        Node::Leaf(s) => Ok(s.into()),
        other => Err(StructuralError::shape(format!("a leaf in field {field:?}"), other)),
    }
}

fn pull_branch(branch: &mut Branch, field: &str, counters: &Counters) -> Result<Branch, StructuralError> {
    match branch.pull(field, counters.is_one(field))? {
        Node::Branch(b) => Ok(b),
        other => Err(StructuralError::shape(format!("a branch in field {field:?}"), other)),
    }
}

fn pull_extra(branch: &mut Branch, field: &str) -> Result<Extra, StructuralError> {
    match branch.pull(field, false)? {
        Node::Extra(extra) => Ok(extra),
        other => Err(StructuralError::shape(format!("bookkeeping in field {field:?}"), other)),
    }
}

fn rebuild(
    branch: &mut Branch,
    env: RuleEnv<'_>,
    term: &Term,
    label: Option<&str>,
    counters: &Counters,
) -> Result<TreeElement, Error> {
    Ok(match term {
        Term::Lit(_) | Term::Regex(_) => pull_leaf(branch, "", counters)?,
        Term::Backref(b) => pull_leaf(branch, &b.ident, counters)?,
        Term::Rule(name) => {
            let (body, defined_in) = env.get(name).ok_or_else(|| Error::UnknownRule(name.clone()))?;
            let child = pull_branch(branch, unlevel(name).0, counters)?;
            unnest(defined_in, body, Some(name), child)?
        }
        Term::Named(n) => {
            let child = pull_branch(branch, &n.name, counters)?;
            unnest(env, &n.term, Some(&n.name), child)?
        }
        Term::Seq(terms) => {
            let mut children = Vec::with_capacity(terms.len());
            for t in terms {
                children.push(rebuild(branch, env, t, None, counters)?);
            }
            tree::Node::new(label.unwrap_or(SEQ_TAG), None, children).into()
        }
        Term::Oneof(terms) => {
            let i = match pull_extra(branch, CHOICE_TAG)? {
                Extra::Choice(i) => i,
                other => return Err(StructuralError::shape("an alternative index", other).into()),
            };
            let alt = terms.get(i).ok_or_else(|| StructuralError::CountOutOfBounds {
                what: "alternative",
                count: i,
                min: 0,
                max: terms.len().saturating_sub(1).to_string(),
            })?;
            let child = rebuild(branch, env, alt, None, counters)?;
            tree::Node::new(label.unwrap_or(ONEOF_TAG), Some(tree::Extra::Choice(i)), vec![child]).into()
        }
        Term::Quant(q) => {
            let count = match pull_extra(branch, COUNT_TAG)? {
                Extra::Count(n) => n,
                other => return Err(StructuralError::shape("a repetition count", other).into()),
            };
            if count < q.min || (q.max != 0 && count > q.max) {
                let max = if q.max == 0 { "unbounded".to_string() } else { q.max.to_string() };
                return Err(StructuralError::CountOutOfBounds { what: "repetition", count, min: q.min, max }.into());
            }
            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                children.push(rebuild(branch, env, &q.term, None, counters)?);
            }
            tree::Node::new(label.unwrap_or(QUANT_TAG), None, children).into()
        }
        Term::Delim(d) => {
            let (terms, leading, trailing) = match pull_extra(branch, DELIM_TAG)? {
                Extra::Delim { terms, leading, trailing } => (terms, leading, trailing),
                other => return Err(StructuralError::shape("a list shape", other).into()),
            };
            let min = 1 + usize::from(leading) + usize::from(trailing);
            if terms < min {
                let max = "unbounded".to_string();
                return Err(StructuralError::CountOutOfBounds { what: "list term", count: terms, min, max }.into());
            }
            let mut slots = Vec::with_capacity(2 * terms - 1);
            for i in 0..terms {
                if i > 0 {
                    slots.push(rebuild(branch, env, &d.sep, None, counters)?);
                }
                let elided = (i == 0 && leading) || (i == terms - 1 && trailing);
                slots.push(match elided {
                    true => TreeElement::Empty,
                    false => rebuild(branch, env, &d.term, None, counters)?,
                });
            }
            fold_delim(label.unwrap_or(tree::DELIM_TAG), d.assoc, slots)
        }
        Term::CutPoint(inner) => rebuild(branch, env, inner, label, counters)?,
        Term::ScopedGrammar(sg) => rebuild(branch, env.scoped(&sg.grammar), &sg.term, label, counters)?,
        Term::Stack(_) => return Err(StructuralError::MisplacedStack.into()),
    })
}
