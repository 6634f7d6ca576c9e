//! Structural operations over the term algebra.
//!
//! - `Display` for [`Term`] and [`Grammar`] prints grammar source that parses
//!   back to the same terms (for grammars that came from source).
//! - [`Term::resolve`] is the pure substitution used by stack elimination.
//! - [`Grammar::eliminate_stacks`] rewrites every `Stack` rule into its chain
//!   of layer rules.
//!
//! ## Printing precedence
//!
//! ```text
//! 0  a > b        Stack
//! 1  a | b        Oneof
//! 2  a b          Seq, ScopedGrammar
//! 3  a?  a:b  n=a Quant, Delim, Named
//! 4  x "x" /{x}   atoms, empty ()
//! ```
//!
//! A child printed below the precedence its position requires is
//! parenthesised.

use crate::error::StructuralError;
use crate::{Grammar, STACK_PLACEHOLDER, Term};
use std::fmt::{self, Write};

const PREC_STACK: u8 = 0;
const PREC_ONEOF: u8 = 1;
const PREC_SEQ: u8 = 2;
const PREC_POSTFIX: u8 = 3;
const PREC_ATOM: u8 = 4;

impl Term {
    /// Replace every reference to `old` with a reference to `new`.
    ///
    /// Fails on a nested `Stack`, which has no meaning inside a layer.
    pub fn resolve(&self, old: &str, new: &str) -> Result<Term, StructuralError> {
        let resolve_all = |terms: &[Term]| terms.iter().map(|t| t.resolve(old, new)).collect::<Result<Vec<_>, _>>();
        Ok(match self {
            Term::Rule(name) if name == old => Term::Rule(new.to_string()),
            Term::Rule(_) | Term::Lit(_) | Term::Regex(_) => self.clone(),
            Term::Seq(terms) => Term::Seq(resolve_all(terms)?),
            Term::Oneof(terms) => Term::Oneof(resolve_all(terms)?),
            Term::Delim(d) => {
                let mut d = d.clone();
                d.term = Box::new(d.term.resolve(old, new)?);
                d.sep = Box::new(d.sep.resolve(old, new)?);
                Term::Delim(d)
            }
            Term::Quant(q) => {
                let mut q = q.clone();
                q.term = Box::new(q.term.resolve(old, new)?);
                Term::Quant(q)
            }
            Term::Named(n) => Term::named(n.name.clone(), n.term.resolve(old, new)?),
            Term::Stack(_) => return Err(StructuralError::NestedStack { placeholder: old.to_string() }),
            Term::Backref(b) => {
                let default = b.default.as_deref().map(|t| t.resolve(old, new)).transpose()?;
                Term::backref(b.ident.clone(), default)
            }
            Term::CutPoint(t) => Term::cut(t.resolve(old, new)?),
            // Local rules keep their own placeholders.
            Term::ScopedGrammar(sg) => Term::scoped(sg.term.resolve(old, new)?, sg.grammar.clone()),
        })
    }

    /// The scope name a successfully parsed instance of this term is bound under.
    pub(crate) fn scope_ident(&self) -> Option<&str> {
        match self {
            Term::Named(n) if !n.name.is_empty() => Some(&n.name),
            Term::Named(n) => n.term.scope_ident(),
            Term::Rule(name) => Some(name),
            Term::Quant(q) => q.term.scope_ident(),
            _ => None,
        }
    }

    /// True for a cutpoint, looking through capture names.
    pub(crate) fn is_cutpoint(&self) -> bool {
        match self {
            Term::CutPoint(_) => true,
            Term::Named(n) => n.term.is_cutpoint(),
            _ => false,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Term::Stack(_) => PREC_STACK,
            Term::Oneof(_) => PREC_ONEOF,
            Term::Seq(terms) if terms.is_empty() => PREC_ATOM,
            Term::Seq(_) | Term::ScopedGrammar(_) => PREC_SEQ,
            Term::Quant(_) | Term::Delim(_) | Term::Named(_) => PREC_POSTFIX,
            Term::CutPoint(t) => t.precedence(),
            Term::Rule(_) | Term::Lit(_) | Term::Regex(_) | Term::Backref(_) => PREC_ATOM,
        }
    }

    fn write_at(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            f.write_char('(')?;
            self.write_at(f, PREC_STACK)?;
            return f.write_char(')');
        }
        match self {
            Term::Rule(name) => f.write_str(name),
            Term::Lit(text) => f.write_str(&quote_literal(text)),
            Term::Regex(pattern) => write!(f, "/{{{}}}", escape_regex_body(pattern)),
            Term::Seq(terms) if terms.is_empty() => f.write_str("()"),
            Term::Seq(terms) => write_joined(f, terms, " ", PREC_POSTFIX),
            Term::Oneof(terms) => write_joined(f, terms, " | ", PREC_SEQ),
            Term::Stack(terms) => write_joined(f, terms, " > ", PREC_ONEOF),
            Term::Named(n) => {
                write!(f, "{}=", n.name)?;
                n.term.write_at(f, PREC_ATOM)
            }
            Term::Quant(q) => {
                q.term.write_at(f, PREC_POSTFIX)?;
                match (q.min, q.max) {
                    (0, 1) => f.write_char('?'),
                    (0, 0) => f.write_char('*'),
                    (1, 0) => f.write_char('+'),
                    (min, max) => {
                        f.write_char('{')?;
                        if min > 0 {
                            write!(f, "{min}")?;
                        }
                        f.write_char(',')?;
                        if max > 0 {
                            write!(f, "{max}")?;
                        }
                        f.write_char('}')
                    }
                }
            }
            Term::Delim(d) => {
                d.term.write_at(f, PREC_POSTFIX)?;
                f.write_str(d.assoc.op())?;
                if d.can_start_with_sep() {
                    f.write_char(',')?;
                }
                match d.sep.as_ref() {
                    named @ Term::Named(_) => named.write_at(f, PREC_POSTFIX)?,
                    sep => sep.write_at(f, PREC_ATOM)?,
                }
                if d.can_end_with_sep() {
                    f.write_char(',')?;
                }
                Ok(())
            }
            Term::Backref(b) => {
                write!(f, "%{}", b.ident)?;
                match b.default.as_deref() {
                    Some(default) => {
                        f.write_char('=')?;
                        default.write_at(f, PREC_ATOM)
                    }
                    None => Ok(()),
                }
            }
            // Cutpoints have no surface syntax.
            Term::CutPoint(t) => t.write_at(f, min),
            Term::ScopedGrammar(sg) => {
                match sg.term.as_ref() {
                    Term::Seq(terms) if !terms.is_empty() => write_joined(f, terms, " ", PREC_POSTFIX)?,
                    term => term.write_at(f, PREC_POSTFIX)?,
                }
                f.write_str(" { ")?;
                for (name, term) in &sg.grammar {
                    write!(f, "{name} -> {term}; ")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Term], sep: &str, min: u8) -> fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        term.write_at(f, min)?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_at(f, PREC_STACK)
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, term) in self {
            writeln!(f, "{name} -> {term};")?;
        }
        Ok(())
    }
}

/// Double-quoted source form of a literal.
pub(crate) fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Regex bodies lose their whitespace when read back, so spell it out.
fn escape_regex_body(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            ' ' => out.push_str("\\_"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Split a stack layer rule name such as `expr@2` into `("expr", 2)`.
pub fn unlevel(name: &str) -> (&str, usize) {
    match regex!(r"^(.+)@(\d+)$").captures(name) {
        Some(caps) => match (caps.get(1), caps.get(2).and_then(|m| m.as_str().parse().ok())) {
            (Some(base), Some(level)) => (base.as_str(), level),
            _ => (name, 0),
        },
        None => (name, 0),
    }
}

/// Name of layer `level` of the stack rule `base`.
pub(crate) fn level_name(base: &str, level: usize) -> String {
    if level == 0 { base.to_string() } else { format!("{base}{STACK_PLACEHOLDER}{level}") }
}

// --- Rewriting --------------------------------------------------------------

fn rewrite_all<E>(terms: &[Term], f: &mut impl FnMut(Term) -> Result<Term, E>) -> Result<Vec<Term>, E> {
    terms.iter().map(|t| t.rewrite(f)).collect()
}

impl Term {
    /// Rebuild the term bottom-up, passing every rebuilt node through `f`.
    ///
    /// Local rules of scoped grammars are rewritten too.
    pub(crate) fn rewrite<E>(&self, f: &mut impl FnMut(Term) -> Result<Term, E>) -> Result<Term, E> {
        let rebuilt = match self {
            Term::Rule(_) | Term::Lit(_) | Term::Regex(_) => self.clone(),
            Term::Seq(terms) => Term::Seq(rewrite_all(terms, f)?),
            Term::Oneof(terms) => Term::Oneof(rewrite_all(terms, f)?),
            Term::Stack(terms) => Term::Stack(rewrite_all(terms, f)?),
            Term::Delim(d) => Term::delim_with(d.term.rewrite(f)?, d.sep.rewrite(f)?, d.assoc, d.flags),
            Term::Quant(q) => Term::quant(q.term.rewrite(f)?, q.min, q.max),
            Term::Named(n) => Term::named(n.name.clone(), n.term.rewrite(f)?),
            Term::Backref(b) => {
                let default = match b.default.as_deref() {
                    Some(d) => Some(d.rewrite(f)?),
                    None => None,
                };
                Term::backref(b.ident.clone(), default)
            }
            Term::CutPoint(t) => Term::cut(t.rewrite(f)?),
            Term::ScopedGrammar(sg) => Term::scoped(sg.term.rewrite(f)?, sg.grammar.rewrite(f)?),
        };
        f(rebuilt)
    }
}

impl Grammar {
    pub(crate) fn rewrite<E>(&self, f: &mut impl FnMut(Term) -> Result<Term, E>) -> Result<Grammar, E> {
        let mut out = Grammar::new();
        for (name, term) in self.rules() {
            out.insert(name, term.rewrite(f)?);
        }
        Ok(out)
    }
}

// --- Stack elimination ------------------------------------------------------

impl Grammar {
    /// Rewrite every rule bound to a `Stack` into one rule per layer, in this
    /// grammar and in every scoped grammar within it.
    ///
    /// ```text
    /// expr -> @:"+" > @:"*" > \d;
    ///
    /// expr   -> expr@1:"+";
    /// expr@1 -> expr@2:"*";
    /// expr@2 -> \d;            (a trailing @ would resolve back to expr)
    /// ```
    pub fn eliminate_stacks(&self) -> Result<Grammar, StructuralError> {
        let scoped = self.rewrite(&mut |term: Term| -> Result<Term, StructuralError> {
            match term {
                Term::ScopedGrammar(sg) => Ok(Term::scoped(*sg.term, sg.grammar.eliminate_layers()?)),
                term => Ok(term),
            }
        })?;
        scoped.eliminate_layers()
    }

    fn eliminate_layers(&self) -> Result<Grammar, StructuralError> {
        let mut out = Grammar::new();
        for (name, term) in self {
            let layers = match term {
                Term::Stack(layers) => layers
                    .iter()
                    .enumerate()
                    .map(|(i, layer)| {
                        let next = level_name(name, (i + 1) % layers.len());
                        Ok((level_name(name, i), layer.resolve(STACK_PLACEHOLDER, &next)?))
                    })
                    .collect::<Result<Vec<_>, StructuralError>>()?,
                term => vec![(name.clone(), term.clone())],
            };
            if layers.len() > 1 {
                tracing::debug!(rule = %name, layers = layers.len(), "stack eliminated");
            }
            for (layer_name, layer) in layers {
                if out.insert(layer_name.clone(), layer).is_some() {
                    return Err(StructuralError::LayerNameClash { rule: layer_name });
                }
            }
        }
        Ok(out)
    }

    /// True if any rule (at the top level) is a precedence stack.
    pub fn has_stacks(&self) -> bool {
        self.rules().any(|(_, t)| matches!(t, Term::Stack(_)))
    }
}

// --- Rule lookup ------------------------------------------------------------

/// Rule lookup through nested scoped grammars: local rules shadow the
/// enclosing ones. Names are resolved lexically: a rule body only sees the
/// rules of the scope that defines it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleEnv<'g> {
    rules: &'g Grammar,
    parent: Option<&'g RuleEnv<'g>>,
}

impl<'g> RuleEnv<'g> {
    pub(crate) fn new(rules: &'g Grammar) -> Self {
        RuleEnv { rules, parent: None }
    }

    /// The body of `name` and the environment it was defined in.
    pub(crate) fn get(&self, name: &str) -> Option<(&'g Term, RuleEnv<'g>)> {
        match self.rules.get(name) {
            Some(term) => Some((term, *self)),
            None => self.parent.and_then(|p| p.get(name)),
        }
    }

    pub(crate) fn scoped<'a>(&'a self, rules: &'a Grammar) -> RuleEnv<'a> {
        RuleEnv { rules, parent: Some(self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Assoc, SepFlags};
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_substitutes_every_reference() {
        let t = seq![
            Term::rule("@"),
            Term::any(Term::named("x", Term::rule("@"))),
            Term::delim(Term::rule("@"), Term::lit(",")),
            Term::rule("other"),
        ];
        let resolved = t.resolve("@", "e@1").unwrap();
        assert_eq!(
            resolved,
            seq![
                Term::rule("e@1"),
                Term::any(Term::named("x", Term::rule("e@1"))),
                Term::delim(Term::rule("e@1"), Term::lit(",")),
                Term::rule("other"),
            ]
        );
    }

    #[test]
    fn resolve_rejects_nested_stacks() {
        let t = oneof![Term::lit("a"), stack![Term::rule("@"), Term::lit("b")]];
        assert!(matches!(t.resolve("@", "x"), Err(StructuralError::NestedStack { .. })));
    }

    #[test]
    fn stacks_become_a_cycle_of_layers() {
        let g = grammar! {
            "expr" => stack![
                Term::delim(Term::rule("@"), Term::re("[-+]")),
                Term::delim(Term::rule("@"), Term::re("[*/]")),
                oneof![Term::re(r"\d+"), seq![Term::lit("("), Term::rule("@"), Term::lit(")")]],
            ],
        };
        let flat = g.eliminate_stacks().unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat.get("expr"), Some(&Term::delim(Term::rule("expr@1"), Term::re("[-+]"))));
        assert_eq!(flat.get("expr@1"), Some(&Term::delim(Term::rule("expr@2"), Term::re("[*/]"))));
        assert_eq!(
            flat.get("expr@2"),
            Some(&oneof![Term::re(r"\d+"), seq![Term::lit("("), Term::rule("expr"), Term::lit(")")]])
        );
    }

    #[test]
    fn stacks_inside_scoped_grammars_are_eliminated() {
        let local = grammar! { "e" => stack![Term::delim(Term::rule("@"), Term::lit("+")), Term::re(r"\d")] };
        let g = grammar! { "a" => Term::scoped(Term::rule("e"), local) };
        let flat = g.eliminate_stacks().unwrap();
        let Some(Term::ScopedGrammar(sg)) = flat.get("a") else { panic!("scoped grammar lost") };
        assert_eq!(sg.grammar.names().collect::<Vec<_>>(), vec!["e", "e@1"]);
        assert!(!sg.grammar.has_stacks());
    }

    #[test]
    fn unlevel_strips_layer_suffix() {
        assert_eq!(unlevel("expr@12"), ("expr", 12));
        assert_eq!(unlevel("expr"), ("expr", 0));
        assert_eq!(unlevel("@"), ("@", 0));
    }

    #[test]
    fn display_uses_minimal_parentheses() {
        let t = seq![
            Term::rule("a"),
            oneof![Term::lit("b"), seq![Term::lit("c"), Term::rule("d")]],
            Term::opt(Term::named("x", Term::re(r"\d+ \w"))),
            Term::named("y", Term::opt(Term::rule("z"))),
        ];
        assert_eq!(t.to_string(), r#"a ("b" | "c" d) x=/{\d+\_\w}? y=(z?)"#);
    }

    #[test]
    fn display_delims_and_quants() {
        let d = Term::delim_with(
            Term::rule("a"),
            Term::named("op", Term::lit(",")),
            Assoc::RightToLeft,
            SepFlags::LEADING | SepFlags::TRAILING,
        );
        assert_eq!(d.to_string(), r#"a<:,op=",","#);
        assert_eq!(Term::quant(Term::lit("a"), 2, 5).to_string(), r#""a"{2,5}"#);
        assert_eq!(Term::quant(Term::lit("a"), 0, 3).to_string(), r#""a"{,3}"#);
        assert_eq!(Term::backref("x", Some(Term::lit("d"))).to_string(), r#"%x="d""#);
        assert_eq!(Term::Seq(vec![]).to_string(), "()");
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(quote_literal("a\"b\\c\n\u{1}"), r#""a\"b\\c\n\x01""#);
    }
}
