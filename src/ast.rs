//! Generic AST.
//!
//! A concrete parse tree mirrors the grammar term by term. The generic tree
//! projects it onto *fields*: every capture name, rule name, backref ident
//! and the unnamed terminal field `""` of a rule body becomes one entry of a
//! [`Branch`], holding either [`Children::One`] or [`Children::Many`].
//!
//! ```text
//! a -> x=/{\d} ("+" y)*;   y -> "y";
//!
//! "1+y+y"  ==>  ('': [1‣+, 3‣+], @count: [2], @rule: a,
//!                x: ('': 0‣1), y: [('': 2‣y), ('': 4‣y)])
//! ```
//!
//! Which of One/Many a field uses is decided by the grammar alone (see
//! `counter.rs`), never by the input, so a rule always yields the same
//! shape.
//!
//! ## Bookkeeping fields
//!
//! - `@rule`: the rule the tree was parsed as (root only).
//! - `@choice`: one entry per `Oneof` traversed, the chosen alternative.
//! - `@count`: one entry per `Quant` traversed, the repetition count.
//! - `@delim`: one entry per `Delim` traversed, its term-slot count and
//!   elided ends.
//!
//! They carry exactly what the field projection loses, so
//! [`to_tree`]`(`[`from_tree`]`(t))` is content-equal to `t`.
//!
//! ## Invariants
//!
//! - Every Many-class field of a branch exists from the moment the branch
//!   is created, possibly empty.
//! - A One-class field is assigned at most once.

#[path = "ast/counter.rs"]
mod counter;
#[path = "ast/from_tree.rs"]
mod from_tree;
#[cfg(test)]
#[path = "ast/tests.rs"]
mod tests;
#[path = "ast/to_tree.rs"]
mod to_tree;

pub(crate) use counter::Counters;
pub(crate) use from_tree::from_flat_tree;
pub(crate) use to_tree::to_flat_tree;

use crate::error::{Error, StructuralError};
use crate::{Grammar, Scanner, TreeElement};
use std::collections::BTreeMap;
use std::fmt;

pub const RULE_TAG: &str = "@rule";
pub const CHOICE_TAG: &str = "@choice";
pub const COUNT_TAG: &str = "@count";
pub const DELIM_TAG: &str = "@delim";

/// Side data recorded alongside the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    Rule(String),
    Choice(usize),
    Count(usize),
    Delim { terms: usize, leading: bool, trailing: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch(Branch),
    Leaf(Scanner),
    Extra(Extra),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    One(Node),
    Many(Vec<Node>),
}

/// Field name → children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    fields: BTreeMap<String, Children>,
}

// --- Entry points -------------------------------------------------------------

/// The generic tree of `tree`, a parse of `rule` under `grammar`.
pub fn from_tree(grammar: &Grammar, rule: &str, tree: &TreeElement) -> Result<Branch, Error> {
    from_flat_tree(&grammar.eliminate_stacks()?, rule, tree)
}

/// The concrete tree a generic tree was taken from.
pub fn to_tree(grammar: &Grammar, branch: &Branch) -> Result<TreeElement, Error> {
    to_flat_tree(&grammar.eliminate_stacks()?, branch)
}

// --- Branch ---------------------------------------------------------------------

impl Branch {
    /// An empty branch with every Many-class field of `counters` in place.
    pub(crate) fn with_fields(counters: &Counters) -> Self {
        let fields = counters.many_fields().map(|name| (name.to_string(), Children::Many(Vec::new()))).collect();
        Branch { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Children> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Children)> {
        self.fields.iter().map(|(name, children)| (name.as_str(), children))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The node of a One-class field.
    pub fn one(&self, name: &str) -> Option<&Node> {
        match self.fields.get(name) {
            Some(Children::One(node)) => Some(node),
            _ => None,
        }
    }

    /// The nodes of a Many-class field; empty if absent.
    pub fn many(&self, name: &str) -> &[Node] {
        match self.fields.get(name) {
            Some(Children::Many(nodes)) => nodes.as_slice(),
            _ => &[],
        }
    }

    /// The first of `names` present in the branch.
    pub fn which<'n>(&self, names: &[&'n str]) -> Option<(&'n str, &Children)> {
        names.iter().find_map(|&name| self.fields.get(name).map(|children| (name, children)))
    }

    /// The first alternative index recorded in this branch.
    pub fn choice(&self) -> Option<usize> {
        match self.many(CHOICE_TAG).first() {
            Some(Node::Extra(Extra::Choice(i))) => Some(*i),
            _ => None,
        }
    }

    pub fn rule(&self) -> Option<&str> {
        match self.one(RULE_TAG) {
            Some(Node::Extra(Extra::Rule(rule))) => Some(rule),
            _ => None,
        }
    }

    pub(crate) fn add(&mut self, name: &str, node: Node, one: bool) -> Result<(), StructuralError> {
        match (self.fields.get_mut(name), one) {
            (None, true) => {
                self.fields.insert(name.to_string(), Children::One(node));
            }
            (None, false) => {
                self.fields.insert(name.to_string(), Children::Many(vec![node]));
            }
            (Some(Children::Many(nodes)), false) => nodes.push(node),
            (Some(_), true) => return Err(StructuralError::DuplicateField { field: name.to_string() }),
            (Some(found), false) => return Err(StructuralError::shape(format!("a Many field {name:?}"), found)),
        }
        Ok(())
    }

    /// Take the next value of a field: the One value, or the front of a Many.
    pub(crate) fn pull(&mut self, name: &str, one: bool) -> Result<Node, StructuralError> {
        let missing = || StructuralError::MissingField { field: name.to_string() };
        let Some(children) = self.fields.get_mut(name) else { return Err(missing()) };
        match children {
            Children::Many(nodes) if nodes.is_empty() => return Err(missing()),
            Children::Many(nodes) if !one => return Ok(nodes.remove(0)),
            Children::One(_) if one => {}
            found => {
                let expected = if one { "a One" } else { "a Many" };
                return Err(StructuralError::shape(format!("{expected} field {name:?}"), found));
            }
        }
        match self.fields.remove(name) {
            Some(Children::One(node)) => Ok(node),
            _ => Err(missing()),
        }
    }

    /// Fail if any field still holds values.
    pub(crate) fn ensure_consumed(&self) -> Result<(), StructuralError> {
        match self.fields.iter().find(|(_, children)| !matches!(children, Children::Many(nodes) if nodes.is_empty())) {
            Some((name, _)) => Err(StructuralError::UnconsumedField { field: name.clone() }),
            None => Ok(()),
        }
    }

    /// Equality of texts, extras and shape, ignoring source positions.
    pub fn content_eq(&self, other: &Branch) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|((na, a), (nb, b))| na == nb && a.content_eq(b))
    }
}

impl Children {
    pub fn nodes(&self) -> &[Node] {
        match self {
            Children::One(node) => std::slice::from_ref(node),
            Children::Many(nodes) => nodes.as_slice(),
        }
    }

    pub fn content_eq(&self, other: &Children) -> bool {
        match (self, other) {
            (Children::One(a), Children::One(b)) => a.content_eq(b),
            (Children::Many(a), Children::Many(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.content_eq(y)),
            _ => false,
        }
    }
}

// --- Node -------------------------------------------------------------------------

impl Node {
    pub fn as_branch(&self) -> Option<&Branch> {
        match self {
            Node::Branch(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Scanner> {
        match self {
            Node::Leaf(s) => Some(s),
            _ => None,
        }
    }

    pub fn one(&self, name: &str) -> Option<&Node> {
        self.as_branch().and_then(|b| b.one(name))
    }

    pub fn many(&self, name: &str) -> &[Node] {
        match self.as_branch() {
            Some(b) => b.many(name),
            None => &[],
        }
    }

    /// Every node under `name`, whether the field is One or Many.
    pub fn all(&self, name: &str) -> Vec<&Node> {
        self.as_branch().and_then(|b| b.get(name)).map(|c| c.nodes().iter().collect()).unwrap_or_default()
    }

    /// The slice covering every leaf under this node.
    pub fn scanner(&self) -> Option<Scanner> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        Scanner::merge(leaves).ok()
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Scanner>) {
        match self {
            Node::Leaf(s) => out.push(s),
            Node::Branch(b) => b.fields.values().flat_map(Children::nodes).for_each(|n| n.collect_leaves(out)),
            Node::Extra(_) => {}
        }
    }

    /// The source text this node covers; empty if it has no leaves.
    pub fn text(&self) -> String {
        self.scanner().map(|s| s.as_str().to_string()).unwrap_or_default()
    }

    pub fn content_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a.as_str() == b.as_str(),
            (Node::Extra(a), Node::Extra(b)) => a == b,
            (Node::Branch(a), Node::Branch(b)) => a.content_eq(b),
            _ => false,
        }
    }
}

// --- Rendering ----------------------------------------------------------------------

impl fmt::Display for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extra::Rule(rule) => f.write_str(rule),
            Extra::Choice(i) | Extra::Count(i) => write!(f, "{i}"),
            Extra::Delim { terms, leading, trailing } => {
                write!(f, "{terms}")?;
                if *leading {
                    f.write_str("+leading")?;
                }
                if *trailing {
                    f.write_str("+trailing")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Branch(b) => write!(f, "{b}"),
            Node::Leaf(s) => write!(f, "{}‣{}", s.offset(), s.as_str()),
            Node::Extra(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::One(node) => write!(f, "{node}"),
            Children::Many(nodes) => {
                f.write_str("[")?;
                for (i, node) in nodes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{node}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// `(name: value, …)`, sorted by name; empty Many fields are left out.
impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let shown = self.fields.iter().filter(|(_, c)| !matches!(c, Children::Many(nodes) if nodes.is_empty()));
        for (i, (name, children)) in shown.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match name.as_str() {
                "" => write!(f, "'': {children}")?,
                name => write!(f, "{name}: {children}")?,
            }
        }
        f.write_str(")")
    }
}
