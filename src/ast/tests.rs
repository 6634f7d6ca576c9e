use super::*;
use crate::{Assoc, SepFlags, Term};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Parse `text` as `rule` and project the tree, checking it converts back.
fn projected(grammar: &Grammar, rule: &str, text: &str) -> (TreeElement, Branch) {
    let parsers = grammar.compile().unwrap();
    let tree = parsers.parse(rule, text).unwrap();
    let branch = from_tree(grammar, rule, &tree).unwrap();
    assert_eq!(to_tree(grammar, &branch).unwrap(), tree, "round trip of {text:?}");
    (tree, branch)
}

fn captures() -> Grammar {
    grammar! {
        "a" => seq![Term::named("x", Term::re(r"\d")), Term::any(seq![Term::lit("+"), Term::rule("y")])],
        "y" => Term::lit("y"),
    }
}

#[test]
fn fields_split_by_capture_and_rule() {
    let (_, branch) = projected(&captures(), "a", "1+y+y");
    assert_eq!(
        branch.to_string(),
        "('': [1‣+, 3‣+], @count: [2], @rule: a, x: ('': 0‣1), y: [('': 2‣y), ('': 4‣y)])"
    );
    assert_eq!(branch.rule(), Some("a"));
    assert_eq!(branch.one("x").map(Node::text), Some("1".to_string()));
    assert_eq!(branch.many("y").len(), 2);
    assert_eq!(branch.which(&["z", "y", "x"]).map(|(name, _)| name), Some("y"));
}

#[test]
fn empty_many_fields_exist_but_are_not_shown() {
    let (_, branch) = projected(&captures(), "a", "7");
    assert_eq!(branch.to_string(), "(@count: [0], @rule: a, x: ('': 0‣7))");
    assert_eq!(branch.get("y"), Some(&Children::Many(Vec::new())));
    assert_eq!(branch.get(""), Some(&Children::Many(Vec::new())));
}

#[test]
fn repeated_terminals_are_always_many() {
    let grammar = grammar! { "a" => Term::any(Term::lit("1")) };
    for text in ["", "1", "111"] {
        let (_, branch) = projected(&grammar, "a", text);
        assert!(matches!(branch.get(""), Some(Children::Many(nodes)) if nodes.len() == text.len()), "{text:?}");
    }
}

#[test]
fn choices_and_list_shapes_are_recorded() {
    let grammar = grammar! {
        "a" => Term::delim(oneof![Term::re(r"\d+"), Term::rule("b")], Term::lit(",")),
        "b" => Term::lit("b"),
    };
    let (_, branch) = projected(&grammar, "a", "1,b");
    assert_eq!(branch.to_string(), "('': [0‣1, 1‣,], @choice: [0, 1], @delim: [2], @rule: a, b: [('': 2‣b)])");
    assert_eq!(branch.choice(), Some(0));
}

#[test]
fn elided_list_ends_are_flagged() {
    let grammar = grammar! {
        "a" => Term::delim_with(Term::re("[a-z]"), Term::lit(","), Assoc::NonAssoc, SepFlags::LEADING | SepFlags::TRAILING),
    };
    let (_, branch) = projected(&grammar, "a", ",a,");
    assert_eq!(branch.to_string(), "('': [0‣,, 1‣a, 2‣,], @delim: [3+leading+trailing], @rule: a)");
}

#[test]
fn captures_and_backrefs_share_a_field() {
    let grammar = grammar! {
        "a" => seq![Term::named("q", Term::re("['\"]")), Term::re("[a-z]*"), Term::backref("q", None)],
    };
    let (_, branch) = projected(&grammar, "a", "'ab'");
    assert_eq!(branch.to_string(), "('': 1‣ab, @rule: a, q: [('': 0‣'), 3‣'])");
}

#[test]
fn stack_layers_nest_under_the_base_name() {
    let grammar = grammar! {
        "expr" => stack![
            Term::delim(Term::rule("@"), Term::lit("+")),
            Term::delim(Term::rule("@"), Term::lit("*")),
            Term::re(r"\d+"),
        ],
    };
    let (_, branch) = projected(&grammar, "expr", "1+2");
    assert_eq!(
        branch.to_string(),
        "('': [1‣+], @delim: [2], @rule: expr, expr: [(@delim: [1], expr: [('': 0‣1)]), (@delim: [1], expr: [('': 2‣2)])])"
    );
    let operands: Vec<String> = branch.many("expr").iter().map(Node::text).collect();
    assert_eq!(operands, vec!["1", "2"]);
}

#[test]
fn outer_rules_reached_from_a_scope_use_their_own_names() {
    let grammar = grammar! {
        "a" => Term::scoped(Term::rule("b"), grammar! { "c" => seq![Term::lit("x"), Term::lit("z")] }),
        "b" => Term::rule("c"),
        "c" => Term::lit("y"),
    };
    let (_, branch) = projected(&grammar, "a", "y");
    assert_eq!(branch.to_string(), "(@rule: a, b: (c: ('': 0‣y)))");
}

#[test]
fn parsers_bridge_through_the_flat_grammar() {
    let grammar = grammar! {
        "expr" => stack![Term::delim_with(Term::rule("@"), Term::lit("-"), Assoc::LeftToRight, SepFlags::empty()), Term::re(r"\d")],
    };
    let parsers = grammar.compile().unwrap();
    let tree = parsers.parse("expr", "1-2-3").unwrap();
    let branch = parsers.to_ast("expr", &tree).unwrap();
    assert_eq!(parsers.from_ast(&branch).unwrap(), tree);
    assert!(matches!(parsers.to_ast("nope", &tree), Err(Error::UnknownRule(_))));
}

// --- Rejected generic trees ---------------------------------------------------

fn structural(result: Result<TreeElement, Error>) -> StructuralError {
    match result {
        Err(Error::Structural(err)) => err,
        other => panic!("expected a structural error, got {other:?}"),
    }
}

#[test]
fn leftover_values_are_rejected() {
    let grammar = captures();
    let (_, mut branch) = projected(&grammar, "a", "1+y");
    let extra = Node::Leaf(Scanner::new("+"));
    branch.add("", extra, false).unwrap();
    assert_eq!(structural(to_tree(&grammar, &branch)), StructuralError::UnconsumedField { field: String::new() });
}

#[test]
fn missing_values_are_rejected() {
    let grammar = captures();
    let (_, mut branch) = projected(&grammar, "a", "1+y");
    branch.fields.remove("y");
    assert_eq!(structural(to_tree(&grammar, &branch)), StructuralError::MissingField { field: "y".to_string() });

    branch.fields.remove(RULE_TAG);
    assert_eq!(structural(to_tree(&grammar, &branch)), StructuralError::MissingField { field: RULE_TAG.to_string() });
}

#[test]
fn counts_outside_the_quantifier_are_rejected() {
    let grammar = grammar! { "a" => Term::quant(Term::lit("1"), 1, 2) };
    let (_, mut branch) = projected(&grammar, "a", "11");
    branch.fields.insert(COUNT_TAG.to_string(), Children::Many(vec![Node::Extra(Extra::Count(3))]));
    assert_eq!(
        structural(to_tree(&grammar, &branch)),
        StructuralError::CountOutOfBounds { what: "repetition", count: 3, min: 1, max: "2".to_string() }
    );
}

#[test]
fn one_fields_are_assigned_once() {
    let (_, mut branch) = projected(&captures(), "a", "1");
    let err = branch.add("x", Node::Leaf(Scanner::new("2")), true).unwrap_err();
    assert_eq!(err, StructuralError::DuplicateField { field: "x".to_string() });
}

#[test]
fn content_equality_ignores_positions() {
    let grammar = captures();
    let (_, a) = projected(&grammar, "a", "1+y");
    let parsers = grammar.compile().unwrap();
    let shifted = parsers.parse_partial("a", &Scanner::new("  1+y").skip(2)).unwrap().0;
    let b = from_tree(&grammar, "a", &shifted).unwrap();
    assert_ne!(a, b);
    assert!(a.content_eq(&b));
}

// --- Round trips ----------------------------------------------------------------

fn lists() -> Grammar {
    grammar! {
        "a" => Term::delim_with(
            oneof![Term::re("[0-9]+"), Term::named("w", Term::re("[a-z]+"))],
            Term::lit(","),
            Assoc::LeftToRight,
            SepFlags::LEADING | SepFlags::TRAILING,
        ),
    }
}

/// Entries separated by `;`: arithmetic, quoted words and `key=arithmetic`
/// pairs, the last with a local `key` rule.
fn entries() -> Grammar {
    let pair = grammar! { "pair" => seq![Term::rule("key"), Term::lit("="), Term::rule("expr")], "key" => Term::re("[a-z]+") };
    grammar! {
        "doc" => Term::delim(Term::rule("entry"), Term::lit(";")),
        "entry" => oneof![Term::rule("expr"), Term::rule("quoted"), Term::scoped(Term::rule("pair"), pair)],
        "expr" => stack![
            Term::delim_with(Term::rule("@"), Term::re("[-+]"), Assoc::LeftToRight, SepFlags::empty()),
            Term::delim(Term::rule("@"), Term::lit("*")),
            Term::re(r"\d+"),
        ],
        "quoted" => seq![Term::named("q", Term::re("['\"]")), Term::re("[a-z]*"), Term::backref("q", None)],
    }
}

const ENTRY: &str = r#"([0-9]{1,2}([-+*][0-9]{1,2}){0,3}|'[a-z]{0,3}'|"[a-z]{0,3}"|[a-z]{1,3}=[0-9]{1,2}([-+*][0-9]{1,2}){0,2})"#;

fn documents() -> impl Strategy<Value = String> {
    proptest::string::string_regex(&format!("{ENTRY}(;{ENTRY}){{0,3}}")).unwrap()
}

proptest! {
    #[test]
    fn generic_trees_convert_back_exactly(text in ",?([0-9]{1,3}|[a-z]{1,3})(,([0-9]{1,3}|[a-z]{1,3})){0,5},?") {
        let grammar = lists();
        let tree = grammar.compile().unwrap().parse("a", &text).unwrap();
        let branch = from_tree(&grammar, "a", &tree).unwrap();
        prop_assert_eq!(to_tree(&grammar, &branch).unwrap(), tree);
    }

    #[test]
    fn stacks_backrefs_and_scopes_convert_back_exactly(text in documents()) {
        let grammar = entries();
        let parsers = grammar.compile().unwrap();
        let tree = parsers.parse("doc", &text).unwrap();
        prop_assert_eq!(parsers.unparse("doc", &tree).unwrap(), text.clone());
        let branch = from_tree(&grammar, "doc", &tree).unwrap();
        prop_assert_eq!(to_tree(&grammar, &branch).unwrap(), tree);
    }
}
