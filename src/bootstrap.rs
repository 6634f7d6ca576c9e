//! The grammar of grammars.
//!
//! Grammar source is parsed by a grammar written in the same language:
//!
//! ```text
//!        GRAMMAR_SOURCE ──parse with grammar()──> TreeElement
//!                                                    │ Grammar::from_tree
//!                                                    v
//!   grammar() (built by hand)  ==  Grammar (parsed)       checked once by core()
//! ```
//!
//! [`core`] compiles the hand-built grammar, parses [`GRAMMAR_SOURCE`] with
//! it, and checks the result is the hand-built grammar again. A mismatch
//! means the two copies drifted apart; that is a defect in this module, so
//! the first call panics instead of returning an error.
//!
//! ## Surface syntax
//!
//! ```text
//! a b            sequence              a | b        choice
//! a > b          precedence layers     @            next layer
//! a? a* a+       repetition            a{m,n}       bounded repetition
//! a:b a:>b a<:b  delimited list        a:,b,        leading/trailing separators
//! x=a            capture               %x %x="d"    backreference
//! "s" 's' `s`    literal               /{re}        regex (spaces ignored, \_ is a space)
//! ()             empty                 a { r -> ..; }  local rules
//! ```
//!
//! Repetitions apply in the order written: `a*:","` is a list of `a*`.

use crate::ast::{self, Branch, Node};
use crate::error::{Error, GrammarError, StructuralError, Violation, ViolationKind};
use crate::{Assoc, Grammar, Parsers, Scanner, SepFlags, Term, TreeElement};
use once_cell::sync::Lazy;
use std::str::FromStr;

/// Top rule of the grammar of grammars.
pub const GRAMMAR_RULE: &str = "grammar";

/// The grammar of grammars, in its own language.
pub const GRAMMAR_SOURCE: &str = r#"
// Non-terminals
grammar -> stmt+;
stmt    -> COMMENT | prod;
prod    -> IDENT "->" term+ ";";
term    -> @:op=">"
         > @:op="|"
         > @+ ("{" grammar "}")?
         > named quant*;
named   -> (IDENT op="=")? atom;
quant   -> op=/{[?*+]}
         | "{" min=INT? "," max=INT? "}"
         | op=/{<:|:>?} opt_leading=","? named opt_trailing=","?;
atom    -> IDENT | STR | RE | REF | "(" term ")" | "(" ")";

// Terminals
COMMENT -> /{ //.*$
            | (?s: /\* (?: [^*] | \*+[^*/] )* \*+/ )
            };
IDENT   -> /{@|[A-Za-z_\.]\w*};
INT     -> /{\d+};
STR     -> /{ " (?: \\. | [^\\"] )* "
            | ' (?: \\. | [^\\'] )* '
            | ` (?: `` | [^`] )* `
            };
RE      -> /{
             /\{
               ((?:
                 \\.
                 | \{ (?: (?: \d+(?:,\d*)? | ,\d+ ) \} )?
                 | \[ (?: \\] | [^\]] )+ ]
                 | [^\\{\}]
               )*)
             \}
           };
REF     -> "%" IDENT ("=" default=STR)?;

// Special
.wrapRE -> /{\s*()\s*};
"#;

static GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    let r = Term::rule;
    let lit = Term::lit;
    grammar! {
        "grammar" => Term::some(r("stmt")),
        "stmt" => oneof![r("COMMENT"), r("prod")],
        "prod" => seq![r("IDENT"), lit("->"), Term::some(r("term")), lit(";")],
        "term" => stack![
            Term::delim(r("@"), Term::named("op", lit(">"))),
            Term::delim(r("@"), Term::named("op", lit("|"))),
            seq![Term::some(r("@")), Term::opt(seq![lit("{"), r("grammar"), lit("}")])],
            seq![r("named"), Term::any(r("quant"))],
        ],
        "named" => seq![Term::opt(seq![r("IDENT"), Term::named("op", lit("="))]), r("atom")],
        "quant" => oneof![
            Term::named("op", Term::re("[?*+]")),
            seq![
                lit("{"),
                Term::opt(Term::named("min", r("INT"))),
                lit(","),
                Term::opt(Term::named("max", r("INT"))),
                lit("}"),
            ],
            seq![
                Term::named("op", Term::re("<:|:>?")),
                Term::opt(Term::named("opt_leading", lit(","))),
                r("named"),
                Term::opt(Term::named("opt_trailing", lit(","))),
            ],
        ],
        "atom" => oneof![
            r("IDENT"),
            r("STR"),
            r("RE"),
            r("REF"),
            seq![lit("("), r("term"), lit(")")],
            seq![lit("("), lit(")")],
        ],
        "COMMENT" => Term::re(r"//.*$|(?s:/\*(?:[^*]|\*+[^*/])*\*+/)"),
        "IDENT" => Term::re(r"@|[A-Za-z_\.]\w*"),
        "INT" => Term::re(r"\d+"),
        "STR" => Term::re(r#""(?:\\.|[^\\"])*"|'(?:\\.|[^\\'])*'|`(?:``|[^`])*`"#),
        "RE" => Term::re(r"/\{((?:\\.|\{(?:(?:\d+(?:,\d*)?|,\d+)\})?|\[(?:\\]|[^\]])+]|[^\\{\}])*)\}"),
        "REF" => seq![lit("%"), r("IDENT"), Term::opt(seq![lit("="), Term::named("default", r("STR"))])],
        crate::WRAP_RE => Term::re(r"\s*()\s*"),
    }
});

static CORE: Lazy<Parsers> = Lazy::new(|| {
    let parsers = match GRAMMAR.compile() {
        Ok(parsers) => parsers,
        Err(err) => panic!("grammar of grammars does not compile: {err}"),
    };
    let parsed = parsers.parse(GRAMMAR_RULE, GRAMMAR_SOURCE).and_then(|tree| Grammar::from_tree(&tree));
    match parsed {
        Ok(parsed) if parsed == *GRAMMAR => {}
        Ok(parsed) => panic!("mismatch between parsed and bootstrap grammar:\n{parsed}"),
        Err(err) => panic!("grammar of grammars does not parse itself: {err}"),
    }
    tracing::info!(rules = GRAMMAR.len(), "grammar of grammars bootstrapped");
    parsers
});

/// The hand-built grammar of grammars.
pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}

/// The compiled grammar of grammars.
///
/// # Panics
///
/// On first use, if [`GRAMMAR_SOURCE`] does not parse back to [`grammar()`].
pub fn core() -> &'static Parsers {
    &CORE
}

/// Parse grammar source. `filename` is only used in diagnostics.
pub fn parse_grammar(text: &str, filename: Option<&str>) -> Result<Grammar, Error> {
    let input = match filename {
        Some(filename) => Scanner::with_filename(text, filename),
        None => Scanner::new(text),
    };
    let tree = core().parse_scanner(GRAMMAR_RULE, &input)?;
    Grammar::from_tree(&tree)
}

impl FromStr for Grammar {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_grammar(text, None)
    }
}

impl Grammar {
    /// Build a grammar from a parse of [`GRAMMAR_RULE`].
    pub fn from_tree(tree: &TreeElement) -> Result<Grammar, Error> {
        let root = ast::from_tree(&GRAMMAR, GRAMMAR_RULE, tree)?;
        let mut builder = Builder { violations: Vec::new() };
        let grammar = builder.grammar(&root)?;
        match builder.violations.is_empty() {
            true => Ok(grammar),
            false => Err(GrammarError { violations: builder.violations }.into()),
        }
    }
}

// --- Generic tree → terms -------------------------------------------------------

fn branch<'b>(node: &'b Node, what: &str) -> Result<&'b Branch, StructuralError> {
    node.as_branch().ok_or_else(|| StructuralError::shape(format!("a {what} branch"), node))
}

fn one<'b>(parent: &'b Branch, field: &str) -> Result<&'b Node, StructuralError> {
    parent.one(field).ok_or_else(|| StructuralError::MissingField { field: field.to_string() })
}

fn collapse(mut terms: Vec<Term>, combine: fn(Vec<Term>) -> Term) -> Term {
    match terms.len() {
        1 => terms.swap_remove(0),
        _ => combine(terms),
    }
}

/// Number of `term` layers above `named quant*`.
const TERM_LAYERS: usize = 3;

struct Builder {
    violations: Vec<Violation>,
}

impl Builder {
    fn grammar(&mut self, root: &Branch) -> Result<Grammar, Error> {
        let mut grammar = Grammar::new();
        for stmt in root.many("stmt") {
            let Some(prod) = stmt.one("prod") else { continue };
            let prod = branch(prod, "prod")?;
            let ident = one(prod, "IDENT")?;
            let name = ident.text();
            let terms = prod.many("term").iter().map(|t| self.term(t, 0)).collect::<Result<Vec<_>, _>>()?;
            if grammar.insert(name.clone(), collapse(terms, Term::Seq)).is_some() {
                let mut violation =
                    Violation::new(ViolationKind::DuplicatedRule, format!("rule '{name}' is defined more than once"));
                if let Some(at) = ident.scanner() {
                    violation = violation.at(at.position());
                }
                self.violations.push(violation);
            }
        }
        Ok(grammar)
    }

    fn term(&mut self, node: &Node, level: usize) -> Result<Term, Error> {
        let b = branch(node, "term")?;
        if level == TERM_LAYERS {
            let mut term = self.named(one(b, "named")?)?;
            for quant in b.many("quant") {
                term = self.quant(quant, term)?;
            }
            return Ok(term);
        }
        let terms = b.many("term").iter().map(|t| self.term(t, level + 1)).collect::<Result<Vec<_>, _>>()?;
        Ok(match level {
            0 => collapse(terms, Term::Stack),
            1 => collapse(terms, Term::Oneof),
            _ => {
                let term = collapse(terms, Term::Seq);
                match b.one(GRAMMAR_RULE) {
                    Some(local) => Term::scoped(term, self.grammar(branch(local, "grammar")?)?),
                    None => term,
                }
            }
        })
    }

    fn named(&mut self, node: &Node) -> Result<Term, Error> {
        let b = branch(node, "named")?;
        let atom = self.atom(one(b, "atom")?)?;
        Ok(match b.one("IDENT") {
            Some(ident) => Term::named(ident.text(), atom),
            None => atom,
        })
    }

    fn atom(&mut self, node: &Node) -> Result<Term, Error> {
        let b = branch(node, "atom")?;
        let text = |field| one(b, field).map(Node::text);
        Ok(match b.choice() {
            Some(0) => Term::Rule(text("IDENT")?),
            Some(1) => Term::Lit(self.literal(one(b, "STR")?)),
            Some(2) => Term::Regex(regex_body(&text("RE")?)),
            Some(3) => {
                let reference = branch(one(b, "REF")?, "REF")?;
                let default = reference.one("default").map(|d| Term::Lit(self.literal(d)));
                Term::backref(one(reference, "IDENT")?.text(), default)
            }
            Some(4) => self.term(one(b, "term")?, 0)?,
            _ => Term::Seq(Vec::new()),
        })
    }

    fn quant(&mut self, node: &Node, term: Term) -> Result<Term, Error> {
        let b = branch(node, "quant")?;
        let op = b.one("op").map(Node::text).unwrap_or_default();
        Ok(match b.choice() {
            Some(0) => match op.as_str() {
                "?" => Term::opt(term),
                "*" => Term::any(term),
                _ => Term::some(term),
            },
            Some(1) => Term::quant(term, self.bound(b, "min"), self.bound(b, "max")),
            _ => {
                let sep = self.named(one(b, "named")?)?;
                let mut flags = SepFlags::empty();
                flags.set(SepFlags::LEADING, b.one("opt_leading").is_some());
                flags.set(SepFlags::TRAILING, b.one("opt_trailing").is_some());
                let assoc = Assoc::from_op(&op).ok_or_else(|| StructuralError::shape("a list operator", &op))?;
                Term::delim_with(term, sep, assoc, flags)
            }
        })
    }

    /// An optional `{m,n}` bound; absent means 0.
    fn bound(&mut self, quant: &Branch, field: &str) -> usize {
        let Some(node) = quant.one(field) else { return 0 };
        let text = node.text();
        text.parse().unwrap_or_else(|_| {
            self.violate(node, ViolationKind::MinMaxQuantError, format!("quant bound {text} is out of range"));
            0
        })
    }

    /// The value of a quoted literal; bad escapes are reported and kept verbatim.
    fn literal(&mut self, node: &Node) -> String {
        let quoted = node.text();
        unescape(&quoted).unwrap_or_else(|why| {
            self.violate(node, ViolationKind::InvalidLiteral, format!("literal {quoted} {why}"));
            quoted
        })
    }

    fn violate(&mut self, node: &Node, kind: ViolationKind, message: String) {
        let violation = Violation::new(kind, message);
        self.violations.push(match node.scanner() {
            Some(at) => violation.at(at.position()),
            None => violation,
        });
    }
}

/// Strip whitespace from a regex body, then turn `\_` into a space.
fn regex_body(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().filter(|c| !c.is_whitespace());
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('_') => out.push(' '),
            Some(escaped) => {
                out.push('\\');
                out.push(escaped);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn unescape(quoted: &str) -> Result<String, String> {
    let quote = quoted.chars().next().ok_or("is empty")?;
    let body = quoted
        .strip_prefix(quote)
        .and_then(|rest| rest.strip_suffix(quote))
        .ok_or("is not terminated")?;
    if quote == '`' {
        return Ok(body.replace("``", "`"));
    }
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escape = chars.next().ok_or("ends in a backslash")?;
        out.push(match escape {
            'x' => code_point(&mut chars, 2, 16)?,
            'u' => code_point(&mut chars, 4, 16)?,
            'U' => code_point(&mut chars, 8, 16)?,
            '0'..='7' => {
                let rest: String = chars.by_ref().take(2).collect();
                code_point(&mut format!("{escape}{rest}").chars(), 3, 8)?
            }
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' | '\'' | '"' => escape,
            other => return Err(format!("has an unrecognized escape \\{other}")),
        });
    }
    Ok(out)
}

fn code_point(chars: &mut impl Iterator<Item = char>, digits: usize, radix: u32) -> Result<char, String> {
    let text: String = chars.take(digits).collect();
    u32::from_str_radix(&text, radix)
        .ok()
        .filter(|_| text.len() == digits)
        .and_then(char::from_u32)
        .ok_or_else(|| format!("has a bad escape code {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parsed(text: &str) -> Grammar {
        text.parse().unwrap_or_else(|err| panic!("{text:?} does not parse: {err}"))
    }

    #[test]
    fn core_parses_its_own_source() {
        assert_eq!(parsed(GRAMMAR_SOURCE), *grammar());
        assert!(core().rule("term@3").is_some());
    }

    #[test]
    fn display_parses_back() {
        assert_eq!(parsed(&grammar().to_string()), *grammar());
    }

    #[test]
    fn stacks_and_lists() {
        let g = parsed(r"expr -> @:/{[-+]} > @:>op=/{[*/]} > /{\d+};");
        let expected = grammar! {
            "expr" => stack![
                Term::delim(Term::rule("@"), Term::re("[-+]")),
                Term::delim_with(Term::rule("@"), Term::named("op", Term::re("[*/]")), Assoc::LeftToRight, SepFlags::empty()),
                Term::re(r"\d+"),
            ],
        };
        assert_eq!(g, expected);
    }

    #[test]
    fn repetitions_apply_in_written_order() {
        let g = parsed(r#"a -> "x"{2,5} "y"{,3} b*<:,",", "z"?*; b -> "b";"#);
        let body = seq![
            Term::quant(Term::lit("x"), 2, 5),
            Term::quant(Term::lit("y"), 0, 3),
            Term::delim_with(Term::any(Term::rule("b")), Term::lit(","), Assoc::RightToLeft, SepFlags::all()),
            Term::any(Term::opt(Term::lit("z"))),
        ];
        assert_eq!(g.get("a"), Some(&body));
        assert_eq!(parsed(&g.to_string()), g);
    }

    #[test]
    fn captures_backrefs_and_local_rules() {
        let g = parsed(r#"a -> x=b %x="d" () c { c -> "c"; }; b -> "b";"#);
        let body = Term::scoped(
            seq![
                Term::named("x", Term::rule("b")),
                Term::backref("x", Some(Term::lit("d"))),
                Term::Seq(Vec::new()),
                Term::rule("c"),
            ],
            grammar! { "c" => Term::lit("c") },
        );
        assert_eq!(g.get("a"), Some(&body));
        assert_eq!(parsed(&g.to_string()), g);
    }

    #[test]
    fn literals_are_unescaped() {
        let g = parsed(r#"a -> "\x41\t\"" 'it\'s' `a``b` "\101\u00e9";"#);
        let body = seq![Term::lit("A\t\""), Term::lit("it's"), Term::lit("a`b"), Term::lit("Aé")];
        assert_eq!(g.get("a"), Some(&body));
    }

    #[test]
    fn regex_bodies_drop_whitespace() {
        let g = parsed(r"a -> /{ [a-z]+ \_ \d{2,3} };");
        assert_eq!(g.get("a"), Some(&Term::re(r"[a-z]+ \d{2,3}")));
    }

    #[test]
    fn comments_are_skipped() {
        let g = parsed("// one\na -> b; /* two\n */ b -> \"b\";\n");
        assert_eq!(g.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn duplicated_rules_are_reported_with_positions() {
        let err = "a -> \"1\";\na -> \"2\";".parse::<Grammar>().unwrap_err();
        let Error::Grammar(err) = err else { panic!("expected a grammar error, got {err}") };
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].kind, ViolationKind::DuplicatedRule);
        assert_eq!(err.violations[0].position, Some((2, 1)));
    }

    #[test]
    fn bad_escapes_are_reported() {
        let err = r#"a -> "\q";"#.parse::<Grammar>().unwrap_err();
        assert!(matches!(err, Error::Grammar(e) if e.has(ViolationKind::InvalidLiteral)));
    }

    #[test]
    fn malformed_source_fails_to_parse() {
        for text in ["a -> b", "a -> ;", "-> b;"] {
            assert!(matches!(text.parse::<Grammar>(), Err(Error::Parse(_) | Error::UnconsumedInput { .. })), "{text}");
        }
    }

    #[test]
    fn unescape_rejects_truncated_codes() {
        assert_eq!(unescape(r#""\x4""#), Err("has a bad escape code \"4\"".to_string()));
        assert_eq!(unescape("\"ok\""), Ok("ok".to_string()));
    }
}
