//! Concrete tree → generic tree.
//!
//! Walks the tree in lockstep with the term that produced it. Every rule
//! reference and capture opens a nested [`Branch`]; everything else adds
//! into the branch of the enclosing rule.

use super::{Branch, CHOICE_TAG, COUNT_TAG, Counters, DELIM_TAG, Extra, Node, RULE_TAG};
use crate::error::{Error, StructuralError};
use crate::term::{RuleEnv, unlevel};
use crate::{Grammar, Term, TreeElement, WRAP_RE};

pub(crate) fn from_flat_tree(grammar: &Grammar, rule: &str, tree: &TreeElement) -> Result<Branch, Error> {
    let env = RuleEnv::new(grammar);
    let (body, _) = env.get(rule).filter(|_| rule != WRAP_RE).ok_or_else(|| Error::UnknownRule(rule.to_string()))?;
    let mut root = nested(env, body, tree)?;
    root.add(RULE_TAG, Node::Extra(Extra::Rule(rule.to_string())), true)?;
    Ok(root)
}

fn nested(env: RuleEnv<'_>, term: &Term, tree: &TreeElement) -> Result<Branch, Error> {
    let counters = Counters::of(term);
    let mut branch = Branch::with_fields(&counters);
    walk(&mut branch, env, term, &counters, tree)?;
    Ok(branch)
}

fn leaf(term: &Term, tree: &TreeElement) -> Result<Node, StructuralError> {
    match tree {
        TreeElement::Scanner(s) => Ok(Node::Leaf(s.clone())),
        other => Err(StructuralError::shape(format!("a scanner for {term}"), other)),
    }
}

fn expect_node<'t>(tree: &'t TreeElement, term: &Term) -> Result<&'t crate::Node, StructuralError> {
    tree.as_node().ok_or_else(|| StructuralError::shape(format!("a node for {term}"), tree))
}

fn walk(branch: &mut Branch, env: RuleEnv<'_>, term: &Term, counters: &Counters, tree: &TreeElement) -> Result<(), Error> {
    match term {
        Term::Lit(_) | Term::Regex(_) => branch.add("", leaf(term, tree)?, counters.is_one(""))?,
        Term::Backref(b) => branch.add(&b.ident, leaf(term, tree)?, counters.is_one(&b.ident))?,
        Term::Rule(name) => {
            let (body, defined_in) = env.get(name).ok_or_else(|| Error::UnknownRule(name.clone()))?;
            let field = unlevel(name).0;
            let child = nested(defined_in, body, tree)?;
            branch.add(field, Node::Branch(child), counters.is_one(field))?;
        }
        Term::Named(n) => {
            let child = nested(env, &n.term, tree)?;
            branch.add(&n.name, Node::Branch(child), counters.is_one(&n.name))?;
        }
        Term::Seq(terms) => {
            let node = expect_node(tree, term)?;
            if node.children.len() != terms.len() {
                return Err(StructuralError::shape(format!("{} children for {term}", terms.len()), node).into());
            }
            for (t, child) in terms.iter().zip(&node.children) {
                walk(branch, env, t, counters, child)?;
            }
        }
        Term::Oneof(terms) => {
            let node = expect_node(tree, term)?;
            let chosen = node.choice().and_then(|i| terms.get(i).map(|alt| (i, alt)));
            match (chosen, node.children.as_slice()) {
                (Some((i, alt)), [child]) => {
                    branch.add(CHOICE_TAG, Node::Extra(Extra::Choice(i)), false)?;
                    walk(branch, env, alt, counters, child)?;
                }
                _ => return Err(StructuralError::shape(format!("a chosen alternative of {term}"), node).into()),
            }
        }
        Term::Quant(q) => {
            let node = expect_node(tree, term)?;
            branch.add(COUNT_TAG, Node::Extra(Extra::Count(node.children.len())), false)?;
            for child in &node.children {
                walk(branch, env, &q.term, counters, child)?;
            }
        }
        Term::Delim(d) => {
            let node = expect_node(tree, term)?;
            let slots = node.delim_slots().ok_or_else(|| StructuralError::shape(format!("a list for {term}"), node))?;
            let shape = Extra::Delim {
                terms: slots.len().div_ceil(2),
                leading: matches!(slots.first(), Some(TreeElement::Empty)),
                trailing: slots.len() > 1 && matches!(slots.last(), Some(TreeElement::Empty)),
            };
            branch.add(DELIM_TAG, Node::Extra(shape), false)?;
            for (i, slot) in slots.into_iter().enumerate() {
                match (slot, i % 2) {
                    (TreeElement::Empty, _) => {}
                    (slot, 0) => walk(branch, env, &d.term, counters, slot)?,
                    (slot, _) => walk(branch, env, &d.sep, counters, slot)?,
                }
            }
        }
        Term::CutPoint(inner) => walk(branch, env, inner, counters, tree)?,
        Term::ScopedGrammar(sg) => walk(branch, env.scoped(&sg.grammar), &sg.term, counters, tree)?,
        Term::Stack(_) => return Err(StructuralError::MisplacedStack.into()),
    }
    Ok(())
}
