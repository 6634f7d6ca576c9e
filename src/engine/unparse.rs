//! Tree → text.
//!
//! Unparsing walks a concrete tree in lockstep with the term that produced
//! it and writes every scanner leaf back out. Padding skipped by `.wrapRE`
//! is not part of the tree, so it is not reproduced.

use crate::error::{Error, StructuralError};
use crate::term::RuleEnv;
use crate::{Node, Term, TreeElement};

fn expect_node<'t>(tree: &'t TreeElement, term: &Term) -> Result<&'t Node, Error> {
    tree.as_node().ok_or_else(|| StructuralError::shape(format!("a node for {term}"), tree).into())
}

pub(crate) fn unparse(env: RuleEnv<'_>, term: &Term, tree: &TreeElement, out: &mut String) -> Result<(), Error> {
    match term {
        Term::Lit(_) | Term::Regex(_) | Term::Backref(_) => match tree {
            TreeElement::Scanner(s) => out.push_str(s.as_str()),
            other => return Err(StructuralError::shape(format!("a scanner for {term}"), other).into()),
        },
        Term::Rule(name) => {
            let (body, defined_in) = env.get(name).ok_or_else(|| Error::UnknownRule(name.clone()))?;
            unparse(defined_in, body, tree, out)?;
        }
        Term::Named(n) => unparse(env, &n.term, tree, out)?,
        Term::CutPoint(inner) => unparse(env, inner, tree, out)?,
        Term::ScopedGrammar(sg) => unparse(env.scoped(&sg.grammar), &sg.term, tree, out)?,
        Term::Seq(terms) => {
            let node = expect_node(tree, term)?;
            if node.children.len() != terms.len() {
                return Err(StructuralError::shape(format!("{} children for {term}", terms.len()), node).into());
            }
            for (t, child) in terms.iter().zip(&node.children) {
                unparse(env, t, child, out)?;
            }
        }
        Term::Oneof(terms) => {
            let node = expect_node(tree, term)?;
            match (node.choice().and_then(|i| terms.get(i)), node.children.as_slice()) {
                (Some(alt), [child]) => unparse(env, alt, child, out)?,
                _ => return Err(StructuralError::shape(format!("a chosen alternative of {term}"), node).into()),
            }
        }
        Term::Quant(q) => {
            for child in &expect_node(tree, term)?.children {
                unparse(env, &q.term, child, out)?;
            }
        }
        Term::Delim(d) => {
            let node = expect_node(tree, term)?;
            let slots = node.delim_slots().ok_or_else(|| StructuralError::shape(format!("a list for {term}"), node))?;
            for (i, slot) in slots.into_iter().enumerate() {
                match (slot, i % 2) {
                    (TreeElement::Empty, _) => {}
                    (slot, 0) => unparse(env, &d.term, slot, out)?,
                    (slot, _) => unparse(env, &d.sep, slot, out)?,
                }
            }
        }
        Term::Stack(_) => return Err(StructuralError::MisplacedStack.into()),
    }
    Ok(())
}
