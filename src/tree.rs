//! Concrete parse trees.
//!
//! A successful parse yields a [`TreeElement`] isomorphic to the term that
//! produced it: terminals become [`Scanner`] slices, non-terminals become
//! [`Node`]s tagged with their rule/capture name (or a kind marker when
//! unlabelled).
//!
//! ```text
//! expr║:1[1‣"1", 1‣"+", expr@1║:>3[...]]
//! ^^^^ ^^                         tag ║ extra [children]
//! ```

use crate::{Assoc, Scanner};
use std::fmt;

/// Tag used for an unlabelled `Seq`.
pub const SEQ_TAG: &str = "_";
/// Tag used for an unlabelled `Oneof`.
pub const ONEOF_TAG: &str = "|";
/// Tag used for an unlabelled `Delim`.
pub const DELIM_TAG: &str = ":";
/// Tag used for an unlabelled `Quant`.
pub const QUANT_TAG: &str = "?";

/// Shape of one node of a delimited list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimShape {
    pub assoc: Assoc,
    /// Number of term slots (including elided ones) the node covers.
    pub terms: usize,
}

/// Side payload of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extra {
    /// Index of the `Oneof` alternative that matched.
    Choice(usize),
    Delim(DelimShape),
}

impl fmt::Display for Extra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extra::Choice(i) => write!(f, "{i}"),
            Extra::Delim(shape) => write!(f, "{}{}", shape.assoc.op(), shape.terms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub extra: Option<Extra>,
    pub children: Vec<TreeElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeElement {
    Scanner(Scanner),
    Node(Node),
    /// An elided term slot of a delimited list.
    Empty,
}

impl Node {
    pub fn new(tag: impl Into<String>, extra: Option<Extra>, children: Vec<TreeElement>) -> Self {
        Node { tag: tag.into(), extra, children }
    }

    pub fn choice(&self) -> Option<usize> {
        match self.extra {
            Some(Extra::Choice(i)) => Some(i),
            _ => None,
        }
    }

    pub fn delim_shape(&self) -> Option<DelimShape> {
        match self.extra {
            Some(Extra::Delim(shape)) => Some(shape),
            _ => None,
        }
    }
}

// --- Delimited lists ----------------------------------------------------------

/// Fold the flat slots `t0 s0 t1 … tn` of a delimited list into nodes.
pub(crate) fn fold_delim(tag: &str, assoc: Assoc, slots: Vec<TreeElement>) -> TreeElement {
    let terms = slots.len().div_ceil(2);
    let shape = |terms| Some(Extra::Delim(DelimShape { assoc, terms }));
    if assoc == Assoc::NonAssoc || terms < 2 {
        return Node::new(tag, shape(terms), slots).into();
    }
    let mut slots = slots.into_iter();
    match assoc {
        Assoc::LeftToRight => {
            let mut acc = slots.next().unwrap_or(TreeElement::Empty);
            for covered in 2..=terms {
                let (Some(sep), Some(term)) = (slots.next(), slots.next()) else { break };
                acc = Node::new(tag, shape(covered), vec![acc, sep, term]).into();
            }
            acc
        }
        _ => {
            let mut rev = slots.rev();
            let mut acc = rev.next().unwrap_or(TreeElement::Empty);
            for covered in 2..=terms {
                let (Some(sep), Some(term)) = (rev.next(), rev.next()) else { break };
                acc = Node::new(tag, shape(covered), vec![term, sep, acc]).into();
            }
            acc
        }
    }
}

impl Node {
    /// The flat `t0 s0 t1 … tn` slots of a (possibly nested) delimited list node.
    pub fn delim_slots(&self) -> Option<Vec<&TreeElement>> {
        let shape = self.delim_shape()?;
        if shape.assoc == Assoc::NonAssoc || shape.terms < 3 {
            return Some(self.children.iter().collect());
        }
        let [first, sep, last] = self.children.as_slice() else { return None };
        Some(match shape.assoc {
            Assoc::LeftToRight => {
                let mut slots = self.inner_slots(shape, first)?;
                slots.extend([sep, last]);
                slots
            }
            _ => {
                let mut slots = vec![first, sep];
                slots.extend(self.inner_slots(shape, last)?);
                slots
            }
        })
    }

    /// Slots of `child` if it is the next fold of this list.
    fn inner_slots<'a>(&self, shape: DelimShape, child: &'a TreeElement) -> Option<Vec<&'a TreeElement>> {
        let inner = Some(DelimShape { terms: shape.terms - 1, ..shape });
        child.as_node().filter(|n| n.tag == self.tag && n.delim_shape() == inner).and_then(Node::delim_slots)
    }
}

impl TreeElement {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            TreeElement::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_scanner(&self) -> Option<&Scanner> {
        match self {
            TreeElement::Scanner(s) => Some(s),
            _ => None,
        }
    }

    /// Every scanner leaf, left to right.
    pub fn scanners(&self) -> Vec<&Scanner> {
        let mut out = Vec::new();
        self.collect_scanners(&mut out);
        out
    }

    fn collect_scanners<'a>(&'a self, out: &mut Vec<&'a Scanner>) {
        match self {
            TreeElement::Scanner(s) => out.push(s),
            TreeElement::Node(node) => node.children.iter().for_each(|c| c.collect_scanners(out)),
            TreeElement::Empty => {}
        }
    }

    /// The concatenated text of every leaf.
    pub fn text(&self) -> String {
        self.scanners().into_iter().map(Scanner::as_str).collect()
    }

    /// Structural equality that ignores source positions.
    pub fn content_eq(&self, other: &TreeElement) -> bool {
        match (self, other) {
            (TreeElement::Scanner(a), TreeElement::Scanner(b)) => a.as_str() == b.as_str(),
            (TreeElement::Empty, TreeElement::Empty) => true,
            (TreeElement::Node(a), TreeElement::Node(b)) => {
                a.tag == b.tag
                    && a.extra == b.extra
                    && a.children.len() == b.children.len()
                    && a.children.iter().zip(&b.children).all(|(x, y)| x.content_eq(y))
            }
            _ => false,
        }
    }
}

impl From<Scanner> for TreeElement {
    fn from(s: Scanner) -> Self {
        TreeElement::Scanner(s)
    }
}

impl From<Node> for TreeElement {
    fn from(node: Node) -> Self {
        TreeElement::Node(node)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)?;
        if let Some(extra) = &self.extra {
            write!(f, "║{extra}")?;
        }
        f.write_str("[")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for TreeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeElement::Scanner(s) => write!(f, "{s:?}"),
            TreeElement::Node(node) => write!(f, "{node}"),
            TreeElement::Empty => f.write_str("∅"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> (Scanner, TreeElement) {
        let src = Scanner::new("a,b");
        let tree = Node::new(
            "list",
            Some(Extra::Delim(DelimShape { assoc: Assoc::NonAssoc, terms: 2 })),
            vec![src.slice(0, 1).into(), src.slice(1, 2).into(), src.slice(2, 3).into()],
        );
        (src, tree.into())
    }

    #[test]
    fn display_shows_tags_extras_and_leaves() {
        let (_, tree) = sample();
        assert_eq!(tree.to_string(), r#"list║:2[0‣"a", 1‣",", 2‣"b"]"#);
        assert_eq!(TreeElement::Empty.to_string(), "∅");
    }

    #[test]
    fn text_concatenates_leaves() {
        let (_, tree) = sample();
        assert_eq!(tree.text(), "a,b");
        assert_eq!(tree.scanners().len(), 3);
    }

    fn flat_slots(text: &str) -> Vec<TreeElement> {
        let src = Scanner::new(text);
        (0..text.len()).map(|i| src.slice(i, i + 1).into()).collect()
    }

    #[test]
    fn delim_folds_by_associativity() {
        let cases = vec![
            (Assoc::NonAssoc, r#"e║:3[0‣"1", 1‣"+", 2‣"2", 3‣"+", 4‣"3"]"#),
            (Assoc::LeftToRight, r#"e║:>3[e║:>2[0‣"1", 1‣"+", 2‣"2"], 3‣"+", 4‣"3"]"#),
            (Assoc::RightToLeft, r#"e║<:3[0‣"1", 1‣"+", e║<:2[2‣"2", 3‣"+", 4‣"3"]]"#),
        ];
        for (assoc, expected) in cases {
            let tree = fold_delim("e", assoc, flat_slots("1+2+3"));
            assert_eq!(tree.to_string(), expected);

            let slots = tree.as_node().and_then(Node::delim_slots).unwrap();
            let text: String = slots.iter().map(|s| s.text()).collect();
            assert_eq!(text, "1+2+3");
        }
    }

    #[test]
    fn delim_single_term_is_one_node() {
        let tree = fold_delim("e", Assoc::LeftToRight, flat_slots("7"));
        assert_eq!(tree.to_string(), r#"e║:>1[0‣"7"]"#);
        assert_eq!(tree.as_node().and_then(Node::delim_slots).map(|s| s.len()), Some(1));
    }

    #[test]
    fn content_eq_ignores_positions() {
        let (_, tree) = sample();
        let other_src = Scanner::new("xxa,b");
        let other = Node::new(
            "list",
            Some(Extra::Delim(DelimShape { assoc: Assoc::NonAssoc, terms: 2 })),
            vec![other_src.slice(2, 3).into(), other_src.slice(3, 4).into(), other_src.slice(4, 5).into()],
        );
        assert!(tree.content_eq(&other.clone().into()));
        assert_ne!(tree, TreeElement::Node(other));

        let different = Node::new("list", Some(Extra::Choice(0)), vec![]);
        assert!(!tree.content_eq(&different.into()));
    }
}
