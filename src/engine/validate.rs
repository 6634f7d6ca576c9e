//! Grammar validation.
//!
//! Term-level checks walk the grammar as written (stacks still in place);
//! the cycle check runs over the compiled parser graph, where every rule
//! reference is an explicit edge.
//!
//! ## Cycle check
//!
//! A rule is left-recursive if it can reach itself without consuming input.
//! Nullability is computed to a fixpoint first:
//!
//! ```text
//! Lit        nullable iff empty      Seq    all children nullable
//! Regex      never                   Oneof  any alternative nullable
//! Backref    always                  Quant  min = 0 or term nullable
//! Call       target nullable         Delim  term nullable
//! ```
//!
//! Then each rule's *start set* (rules reachable before anything must be
//! consumed) gives a graph whose cycles are reported as `a > b > a`.

use super::compiler::{ParserId, ParserKind, Program};
use crate::error::{Violation, ViolationKind};
use crate::{Grammar, STACK_PLACEHOLDER, SepFlags, Term, WRAP_RE};
use std::collections::{BTreeSet, HashMap, HashSet};

// --- Term checks ------------------------------------------------------------

struct TermChecker {
    violations: Vec<Violation>,
}

impl TermChecker {
    fn grammar(&mut self, grammar: &Grammar, outer: &im::HashSet<String>) {
        let mut known = outer.clone();
        known.extend(grammar.names().map(str::to_string));
        for (name, term) in grammar.rules() {
            match term {
                Term::Stack(layers) => layers.iter().for_each(|layer| self.term(name, layer, &known, true)),
                _ if name == WRAP_RE => {}
                term => self.term(name, term, &known, false),
            }
        }
    }

    fn push(&mut self, kind: ViolationKind, message: String) {
        self.violations.push(Violation::new(kind, message));
    }

    fn term(&mut self, rule: &str, term: &Term, known: &im::HashSet<String>, in_stack: bool) {
        match term {
            Term::Rule(name) => {
                let placeholder = in_stack && name == STACK_PLACEHOLDER;
                if !placeholder && !known.contains(name) {
                    self.push(ViolationKind::UnknownRule, format!("{rule}: identifier '{name}' is not a defined rule"));
                }
            }
            Term::Lit(_) => {}
            Term::Regex(re) => {
                if let Err(err) = regex::Regex::new(re) {
                    self.push(ViolationKind::InvalidRegex, format!("{rule}: regex '{re}' is not valid, {err}"));
                }
            }
            Term::Seq(terms) => {
                let mut seen = HashSet::new();
                for t in terms {
                    if let Term::Named(n) = t {
                        if !n.name.is_empty() && !seen.insert(n.name.as_str()) {
                            self.push(
                                ViolationKind::MultipleTermsWithSameName,
                                format!("{rule}: identifier '{}' is being used multiple times in a single term", n.name),
                            );
                        }
                    }
                    self.term(rule, t, known, in_stack);
                }
            }
            Term::Oneof(terms) => terms.iter().for_each(|t| self.term(rule, t, known, in_stack)),
            Term::Stack(_) => self.push(ViolationKind::NestedStack, format!("{rule}: precedence stack nested in a term")),
            Term::Delim(d) => {
                self.term(rule, &d.term, known, in_stack);
                self.term(rule, &d.sep, known, in_stack);
            }
            Term::Quant(q) => {
                if q.min != 0 && q.max != 0 && q.min > q.max {
                    self.push(ViolationKind::MinMaxQuantError, format!("{rule}: quant: min ({}) > max ({})", q.min, q.max));
                }
                self.term(rule, &q.term, known, in_stack);
            }
            Term::Named(n) => {
                if known.contains(&n.name) {
                    self.push(
                        ViolationKind::NameClashesWithRule,
                        format!("{rule}: identifier '{}' clashes with a defined rule", n.name),
                    );
                }
                self.term(rule, &n.term, known, in_stack);
            }
            Term::Backref(b) => {
                if let Some(default) = &b.default {
                    self.term(rule, default, known, in_stack);
                }
            }
            Term::CutPoint(t) => self.term(rule, t, known, in_stack),
            Term::ScopedGrammar(sg) => {
                self.grammar(&sg.grammar, known);
                let mut local = known.clone();
                local.extend(sg.grammar.names().map(str::to_string));
                self.term(rule, &sg.term, &local, in_stack);
            }
        }
    }
}

/// Violations visible without compiling: unknown rules, bad regexes,
/// name clashes, inverted quantifier bounds and duplicate capture names.
pub(crate) fn term_violations(grammar: &Grammar) -> Vec<Violation> {
    let mut checker = TermChecker { violations: Vec::new() };
    checker.grammar(grammar, &im::HashSet::new());
    checker.violations
}

// --- Cycle check ------------------------------------------------------------

fn nullability(program: &Program) -> Vec<bool> {
    let mut nullable = vec![false; program.nodes.len()];
    loop {
        let mut changed = false;
        for (id, node) in program.nodes.iter().enumerate() {
            if nullable[id] {
                continue;
            }
            let now = match &node.kind {
                ParserKind::Unresolved(_) => false,
                ParserKind::Terminal(t) => t.nullable,
                ParserKind::Call(target) | ParserKind::Cut(target) => nullable[*target],
                ParserKind::Seq(items) => items.iter().all(|item| nullable[item.parser]),
                ParserKind::Oneof(alts) => alts.iter().any(|&alt| nullable[alt]),
                ParserKind::Delim(d) => nullable[d.term],
                ParserKind::Quant { term, min, .. } => *min == 0 || nullable[*term],
                ParserKind::Backref { .. } => true,
            };
            if now {
                nullable[id] = true;
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

fn start_set(program: &Program, nullable: &[bool], id: ParserId, rules: &HashMap<ParserId, usize>, out: &mut BTreeSet<usize>) {
    match &program.node(id).kind {
        ParserKind::Call(target) => match rules.get(target) {
            Some(&rule) => {
                out.insert(rule);
            }
            None => start_set(program, nullable, *target, rules, out),
        },
        ParserKind::Cut(inner) => start_set(program, nullable, *inner, rules, out),
        ParserKind::Seq(items) => {
            for item in items {
                start_set(program, nullable, item.parser, rules, out);
                if !nullable[item.parser] {
                    break;
                }
            }
        }
        ParserKind::Oneof(alts) => alts.iter().for_each(|&alt| start_set(program, nullable, alt, rules, out)),
        ParserKind::Quant { term, .. } => start_set(program, nullable, *term, rules, out),
        ParserKind::Delim(d) => {
            start_set(program, nullable, d.term, rules, out);
            if d.flags.contains(SepFlags::LEADING) {
                start_set(program, nullable, d.sep, rules, out);
            }
        }
        ParserKind::Backref { default: Some(default), .. } => start_set(program, nullable, *default, rules, out),
        ParserKind::Backref { default: None, .. } | ParserKind::Terminal(_) | ParserKind::Unresolved(_) => {}
    }
}

/// Left-recursive rule chains in a compiled program.
pub(crate) fn cycle_violations(program: &Program) -> Vec<Violation> {
    let nullable = nullability(program);
    let index: HashMap<ParserId, usize> = program.rule_slots.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
    let edges: Vec<BTreeSet<usize>> = program
        .rule_slots
        .iter()
        .map(|(slot, _)| {
            let mut out = BTreeSet::new();
            if let ParserKind::Call(body) = program.node(*slot).kind {
                start_set(program, &nullable, body, &index, &mut out);
            }
            out
        })
        .collect();

    let mut cycles = Vec::new();
    for root in 0..edges.len() {
        let mut path = vec![root];
        let mut visited = HashSet::from([root]);
        find_cycles(root, root, &edges, &mut path, &mut visited, &mut cycles);
    }
    cycles
        .into_iter()
        .map(|cycle| {
            let route = cycle.iter().map(|&i| program.rule_slots[i].1.as_str()).collect::<Vec<_>>().join(" > ");
            tracing::debug!(%route, "possible cycle");
            Violation::new(ViolationKind::PossibleCycleDetected, format!("possible cycle detected: {route}"))
        })
        .collect()
}

/// Cycles back to `root` through rules no earlier than `root`, so each cycle
/// is found once, from its first rule.
fn find_cycles(
    root: usize,
    at: usize,
    edges: &[BTreeSet<usize>],
    path: &mut Vec<usize>,
    visited: &mut HashSet<usize>,
    cycles: &mut Vec<Vec<usize>>,
) {
    for &next in &edges[at] {
        if next == root {
            let mut cycle = path.clone();
            cycle.push(root);
            cycles.push(cycle);
        } else if next > root && visited.insert(next) {
            path.push(next);
            find_cycles(root, next, edges, path, visited, cycles);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compiler::compile_program;
    use pretty_assertions::assert_eq;

    fn cycles_of(g: &Grammar) -> Vec<String> {
        let program = compile_program(g).unwrap();
        cycle_violations(&program).into_iter().map(|v| v.message).collect()
    }

    #[test]
    fn left_recursion_is_reported() {
        let cases = vec![
            (vec!["possible cycle detected: a > a"], grammar! { "a" => Term::rule("a") }),
            (vec![], grammar! { "a" => seq![Term::lit("@"), Term::rule("a")] }),
            (vec!["possible cycle detected: a > a"], grammar! { "a" => seq![Term::opt(Term::lit("@")), Term::rule("a")] }),
            (
                vec!["possible cycle detected: a > b > c > a"],
                grammar! {
                    "a" => oneof![Term::opt(Term::lit("a")), Term::rule("b")],
                    "b" => Term::rule("c"),
                    "c" => Term::rule("a"),
                },
            ),
            (vec![], grammar! { "a" => Term::lit("a") }),
        ];
        for (expected, g) in cases {
            assert_eq!(cycles_of(&g), expected, "{g}");
        }
    }

    #[test]
    fn term_checks_collect_every_violation() {
        let g = grammar! {
            "a" => seq![
                Term::named("x", Term::lit("1")),
                Term::named("x", Term::lit("2")),
                Term::named("b", Term::re("[")),
                Term::quant(Term::lit("q"), 10, 1),
                Term::rule("missing"),
            ],
            "b" => stack![Term::delim(Term::rule("@"), Term::lit("+")), Term::lit("1")],
        };
        let kinds: Vec<_> = term_violations(&g).into_iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::MultipleTermsWithSameName,
                ViolationKind::NameClashesWithRule,
                ViolationKind::InvalidRegex,
                ViolationKind::MinMaxQuantError,
                ViolationKind::UnknownRule,
            ]
        );
    }

    #[test]
    fn scoped_rules_are_known_inside_their_scope_only() {
        let local = grammar! { "foo" => Term::lit("a") };
        let ok = grammar! { "a" => Term::scoped(Term::rule("foo"), local.clone()) };
        assert!(term_violations(&ok).is_empty());

        let leaked = grammar! { "a" => Term::scoped(Term::rule("foo"), local), "b" => Term::rule("foo") };
        let kinds: Vec<_> = term_violations(&leaked).into_iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::UnknownRule]);
    }
}
