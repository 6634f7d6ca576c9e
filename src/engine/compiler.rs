//! Term → parser graph compilation.
//!
//! Parsers live in one arena (`Vec<ParserNode>`) and refer to each other by
//! index, so recursive and mutually recursive rules need no cyclic ownership.
//!
//! ```text
//! pass 1   register     every rule gets a slot:  [a: ?] [b: ?]
//! pass 2   build        bodies are pushed, slots patched:
//!                         [a: Call(2)] [b: Call(4)] [Seq{.., Call(1)}] ...
//! ```
//!
//! A `Rule` reference compiles to `Call(slot)`. Scoped grammars register
//! their local rules over a copy of the enclosing name table, so lookups
//! fall through to outer rules for anything not redefined locally.
//!
//! ## Invariants
//!
//! - After [`compile_program`] returns, no slot is left `Unresolved`.
//! - Terminal regexes are `\A`-anchored and multi-line.

use crate::error::{Error, GrammarError, StructuralError, Violation, ViolationKind};
use crate::{Assoc, Grammar, SepFlags, Term, WRAP_RE};
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub(crate) type ParserId = usize;

type Names = im::HashMap<String, ParserId>;

#[derive(Debug, Clone)]
pub(crate) struct Terminal {
    pub(crate) re: Regex,
    /// Grammar-source spelling, for diagnostics.
    pub(crate) expect: String,
    pub(crate) nullable: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SeqItem {
    pub(crate) parser: ParserId,
    /// Scope name the item's output is bound under, if a backref needs it.
    pub(crate) bind: Option<String>,
    pub(crate) cut: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct DelimParser {
    pub(crate) term: ParserId,
    pub(crate) sep: ParserId,
    pub(crate) assoc: Assoc,
    pub(crate) flags: SepFlags,
    pub(crate) cut_sep: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum ParserKind {
    Unresolved(String),
    Terminal(Terminal),
    Call(ParserId),
    Seq(Vec<SeqItem>),
    Oneof(Vec<ParserId>),
    Delim(DelimParser),
    Quant { term: ParserId, min: usize, max: usize },
    Backref { ident: String, default: Option<ParserId> },
    Cut(ParserId),
}

#[derive(Debug, Clone)]
pub(crate) struct ParserNode {
    /// Rule or capture name; output nodes are tagged with it.
    pub(crate) label: Option<String>,
    pub(crate) kind: ParserKind,
}

/// A compiled grammar: the parser arena plus the top-level rule table.
#[derive(Debug, Clone)]
pub(crate) struct Program {
    pub(crate) nodes: Vec<ParserNode>,
    pub(crate) rules: HashMap<String, ParserId>,
    /// Every rule slot (scoped ones included) with its name, in build order.
    pub(crate) rule_slots: Vec<(ParserId, String)>,
}

impl Program {
    pub(crate) fn node(&self, id: ParserId) -> &ParserNode {
        &self.nodes[id]
    }
}

// --- Wrapper regex ------------------------------------------------------------

/// The `.wrapRE` configuration: a wrapper pattern containing `()` plus the
/// terminals exempt from wrapping.
#[derive(Debug, Clone)]
pub(crate) struct Wrapper {
    pattern: String,
    exempt: Vec<Term>,
}

impl Wrapper {
    pub(crate) fn from_term(term: &Term) -> Result<Wrapper, Violation> {
        let invalid = |why: &str| Violation::new(ViolationKind::InvalidWrapRE, format!("{WRAP_RE} {why}: {term}"));
        let (last, exempt) = match term {
            Term::Regex(_) => (term, &[][..]),
            Term::Oneof(alts) => match alts.split_last() {
                Some((last, rest)) => (last, rest),
                None => return Err(invalid("is empty")),
            },
            _ => return Err(invalid("must be a regex or a choice ending in one")),
        };
        let Term::Regex(pattern) = last else { return Err(invalid("must end in a regex")) };
        if !pattern.contains("()") {
            return Err(invalid("has no () placeholder"));
        }
        if !exempt.iter().all(|t| matches!(t, Term::Lit(_) | Term::Regex(_))) {
            return Err(invalid("may only exempt literals and regexes"));
        }
        Ok(Wrapper { pattern: pattern.clone(), exempt: exempt.to_vec() })
    }

    fn wrap(&self, term: &Term, inner: String) -> String {
        if self.exempt.contains(term) { inner } else { self.pattern.replacen("()", &format!("(?:{inner})"), 1) }
    }
}

/// Regex source for a literal or regex terminal, with the optional wrapper applied.
pub(crate) fn terminal_pattern(term: &Term, wrap: Option<&Wrapper>) -> Option<String> {
    let inner = match term {
        Term::Lit(text) => format!("({})", regex::escape(text)),
        Term::Regex(re) => format!("({re})"),
        _ => return None,
    };
    let body = match wrap {
        Some(w) => w.wrap(term, inner),
        None => inner,
    };
    Some(format!(r"(?m)\A{body}"))
}

// --- Compilation --------------------------------------------------------------

/// Compile a stack-free grammar.
pub(crate) fn compile_program(grammar: &Grammar) -> Result<Program, Error> {
    let backrefs = backref_idents(grammar);
    let wrap = wrapper_of(grammar, None)?;
    let mut compiler = Compiler { nodes: Vec::new(), rule_slots: Vec::new(), backrefs: &backrefs };
    let names = compiler.register(grammar, &Names::new());
    compiler.build_rules(grammar, &names, wrap.as_ref())?;

    if let Some((_, name)) =
        compiler.rule_slots.iter().find(|(id, _)| matches!(compiler.nodes[*id].kind, ParserKind::Unresolved(_)))
    {
        return Err(Error::UnknownRule(name.clone()));
    }
    tracing::debug!(rules = compiler.rule_slots.len(), parsers = compiler.nodes.len(), "grammar compiled");

    let rules = grammar.names().filter_map(|name| names.get(name).map(|&id| (name.to_string(), id))).collect();
    Ok(Program { nodes: compiler.nodes, rules, rule_slots: compiler.rule_slots })
}

fn wrapper_of(grammar: &Grammar, inherited: Option<&Wrapper>) -> Result<Option<Wrapper>, Error> {
    match grammar.get(WRAP_RE) {
        Some(term) => Wrapper::from_term(term).map(Some).map_err(|v| GrammarError::single(v).into()),
        None => Ok(inherited.cloned()),
    }
}

struct Compiler<'a> {
    nodes: Vec<ParserNode>,
    rule_slots: Vec<(ParserId, String)>,
    backrefs: &'a HashSet<String>,
}

impl Compiler<'_> {
    fn push(&mut self, label: Option<&str>, kind: ParserKind) -> ParserId {
        self.nodes.push(ParserNode { label: label.map(str::to_string), kind });
        self.nodes.len() - 1
    }

    fn register(&mut self, grammar: &Grammar, outer: &Names) -> Names {
        let mut names = outer.clone();
        for name in grammar.names().filter(|name| *name != WRAP_RE) {
            let slot = self.push(None, ParserKind::Unresolved(name.to_string()));
            self.rule_slots.push((slot, name.to_string()));
            names.insert(name.to_string(), slot);
        }
        names
    }

    fn build_rules(&mut self, grammar: &Grammar, names: &Names, wrap: Option<&Wrapper>) -> Result<(), Error> {
        for (name, term) in grammar.rules().filter(|(name, _)| *name != WRAP_RE) {
            let body = self.build(term, Some(name), names, wrap)?;
            if let Some(&slot) = names.get(name) {
                self.nodes[slot].kind = ParserKind::Call(body);
            }
        }
        Ok(())
    }

    fn build(&mut self, term: &Term, label: Option<&str>, names: &Names, wrap: Option<&Wrapper>) -> Result<ParserId, Error> {
        let kind = match term {
            Term::Named(named) => return self.build(&named.term, Some(&named.name), names, wrap),
            Term::ScopedGrammar(sg) => {
                let local_wrap = wrapper_of(&sg.grammar, wrap)?;
                let local = self.register(&sg.grammar, names);
                self.build_rules(&sg.grammar, &local, local_wrap.as_ref())?;
                return self.build(&sg.term, label, &local, local_wrap.as_ref());
            }
            Term::CutPoint(inner) => ParserKind::Cut(self.build(inner, label, names, wrap)?),
            Term::Rule(name) => match names.get(name) {
                Some(&slot) => ParserKind::Call(slot),
                None => return Err(Error::UnknownRule(name.clone())),
            },
            Term::Lit(text) => ParserKind::Terminal(terminal(term, text.is_empty(), wrap)?),
            Term::Regex(_) => ParserKind::Terminal(terminal(term, false, wrap)?),
            Term::Seq(terms) => {
                let mut items = Vec::with_capacity(terms.len());
                for t in terms {
                    let bind = t.scope_ident().filter(|ident| self.backrefs.contains(*ident)).map(str::to_string);
                    items.push(SeqItem { parser: self.build(t, None, names, wrap)?, bind, cut: t.is_cutpoint() });
                }
                ParserKind::Seq(items)
            }
            Term::Oneof(terms) => {
                let alts = terms.iter().map(|t| self.build(t, None, names, wrap)).collect::<Result<_, _>>()?;
                ParserKind::Oneof(alts)
            }
            Term::Delim(d) => ParserKind::Delim(DelimParser {
                term: self.build(&d.term, None, names, wrap)?,
                sep: self.build(&d.sep, None, names, wrap)?,
                assoc: d.assoc,
                flags: d.flags,
                cut_sep: d.sep.is_cutpoint(),
            }),
            Term::Quant(q) => {
                ParserKind::Quant { term: self.build(&q.term, None, names, wrap)?, min: q.min, max: q.max }
            }
            // Backreferences match their bound text exactly; defaults are never wrapped.
            Term::Backref(b) => {
                let default = b.default.as_deref().map(|d| self.build(d, None, names, None)).transpose()?;
                ParserKind::Backref { ident: b.ident.clone(), default }
            }
            Term::Stack(_) => return Err(StructuralError::MisplacedStack.into()),
        };
        Ok(self.push(label, kind))
    }
}

fn terminal(term: &Term, nullable: bool, wrap: Option<&Wrapper>) -> Result<Terminal, Error> {
    let pattern = terminal_pattern(term, wrap).unwrap_or_default();
    let re = Regex::new(&pattern).map_err(|err| {
        GrammarError::single(Violation::new(ViolationKind::InvalidRegex, format!("{term}: {err}")))
    })?;
    Ok(Terminal { re, expect: term.to_string(), nullable })
}

/// Identifiers some backreference in the grammar refers to.
pub(crate) fn backref_idents(grammar: &Grammar) -> HashSet<String> {
    fn walk(term: &Term, out: &mut HashSet<String>) {
        match term {
            Term::Backref(b) => {
                out.insert(b.ident.clone());
                if let Some(d) = &b.default {
                    walk(d, out);
                }
            }
            Term::Seq(ts) | Term::Oneof(ts) | Term::Stack(ts) => ts.iter().for_each(|t| walk(t, out)),
            Term::Delim(d) => {
                walk(&d.term, out);
                walk(&d.sep, out);
            }
            Term::Quant(q) => walk(&q.term, out),
            Term::Named(n) => walk(&n.term, out),
            Term::CutPoint(t) => walk(t, out),
            Term::ScopedGrammar(sg) => {
                walk(&sg.term, out);
                sg.grammar.rules().for_each(|(_, t)| walk(t, out));
            }
            Term::Rule(_) | Term::Lit(_) | Term::Regex(_) => {}
        }
    }
    let mut out = HashSet::new();
    grammar.rules().for_each(|(_, t)| walk(t, &mut out));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rules_compile_to_patched_calls() {
        let g = grammar! {
            "a" => seq![Term::lit("x"), Term::rule("b")],
            "b" => oneof![Term::lit("y"), Term::rule("a")],
        };
        let program = compile_program(&g).unwrap();
        let a = program.rules["a"];
        let b = program.rules["b"];
        let ParserKind::Call(a_body) = program.node(a).kind else { panic!("a is not patched") };
        assert_eq!(program.node(a_body).label.as_deref(), Some("a"));
        let ParserKind::Seq(items) = &program.node(a_body).kind else { panic!("a body is not a seq") };
        assert!(matches!(program.node(items[1].parser).kind, ParserKind::Call(id) if id == b));
    }

    #[test]
    fn unknown_rules_fail_compilation() {
        let g = grammar! { "a" => Term::rule("missing") };
        assert!(matches!(compile_program(&g), Err(Error::UnknownRule(name)) if name == "missing"));
    }

    #[test]
    fn wrapper_applies_to_non_exempt_terminals() {
        let wrap = Wrapper::from_term(&oneof![Term::lit("1"), Term::re(r"\s*()")]).unwrap();
        assert_eq!(terminal_pattern(&Term::lit("1"), Some(&wrap)).unwrap(), r"(?m)\A(1)");
        assert_eq!(terminal_pattern(&Term::lit("2"), Some(&wrap)).unwrap(), r"(?m)\A\s*(?:(2))");
        assert_eq!(terminal_pattern(&Term::lit("a.b"), None).unwrap(), r"(?m)\A(a\.b)");
    }

    #[test]
    fn wrapper_shape_is_checked() {
        assert!(Wrapper::from_term(&Term::re(r"\s*")).is_err());
        assert!(Wrapper::from_term(&Term::lit("()")).is_err());
        assert!(Wrapper::from_term(&oneof![Term::rule("x"), Term::re("()")]).is_err());
    }

    #[test]
    fn only_backref_targets_are_bound() {
        let g = grammar! {
            "a" => seq![Term::named("x", Term::lit("1")), Term::named("y", Term::lit("2")), Term::backref("x", None)],
        };
        let program = compile_program(&g).unwrap();
        let ParserKind::Call(body) = program.node(program.rules["a"]).kind else { panic!() };
        let ParserKind::Seq(items) = &program.node(body).kind else { panic!() };
        let binds: Vec<_> = items.iter().map(|i| i.bind.as_deref()).collect();
        assert_eq!(binds, vec![Some("x"), None, None]);
    }
}
