use crate::ast::Branch;
use crate::bootstrap;
use crate::engine::{Parsers, RunMetrics, timed};
use crate::{Error, Scanner, TreeElement};
use std::time::Duration;

/// Options for turning a grammar into [`Parsers`].
///
/// ```
/// use parsnip::CompileOptions;
///
/// let opts = CompileOptions::default().auto_cutpoints(true).filename("calc.parsnip");
/// assert!(opts.validate);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Reject ill-formed grammars (unknown rules, left recursion, bad regexes...).
    pub validate: bool,
    /// Wrap literals that occur exactly once in the grammar in cutpoints.
    pub auto_cutpoints: bool,
    /// Attached to the grammar source for diagnostics.
    pub filename: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { validate: true, auto_cutpoints: false, filename: None }
    }
}

impl CompileOptions {
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn auto_cutpoints(mut self, auto_cutpoints: bool) -> Self {
        self.auto_cutpoints = auto_cutpoints;
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Compile grammar source with default options.
///
/// # Example
/// ```
/// let parsers = parsnip::compile(r#"expr -> @:"+" > /{\d+};"#).unwrap();
/// assert!(parsers.parse("expr", "1+2+3").is_ok());
/// assert!(parsers.parse("expr", "1+").is_err());
/// ```
pub fn compile(source: &str) -> Result<Parsers, Error> {
    compile_with(source, &CompileOptions::default())
}

pub fn compile_with(source: &str, options: &CompileOptions) -> Result<Parsers, Error> {
    let grammar = bootstrap::parse_grammar(source, options.filename.as_deref())?;
    tracing::debug!(rules = grammar.len(), filename = ?options.filename, "grammar source parsed");
    grammar.compile_with(options)
}

/// Extra information gathered by [`parse_verbose`].
#[derive(Debug, Clone, Default)]
pub struct ParseDetails {
    pub metrics: RunMetrics,
    /// Every rule the compiled grammar can parse, stack layers included.
    pub rules: Vec<String>,
}

/// Result of [`parse_verbose`].
///
/// A grammar that fails to compile is an `Err` of the call itself; a parse
/// failure is reported through `outcome` so timings are still available.
/// `ast` and `unparsed` are `None` when there was no tree to work from.
#[derive(Debug)]
pub struct ParseResultVerbose {
    pub text: String,
    pub rule: String,
    pub outcome: Result<TreeElement, Error>,
    /// The generic tree of a successful parse.
    pub ast: Option<Result<Branch, Error>>,
    /// The tree written back out as text.
    pub unparsed: Option<Result<String, Error>>,
    pub elapsed: Duration,
    pub details: ParseDetails,
}

/// Compile `source`, parse `input` as `rule` and collect everything a
/// grammar author wants to look at: the tree, its generic form, its unparse
/// and how long each step took.
pub fn parse_verbose(
    source: &str,
    rule: &str,
    input: &str,
    options: &CompileOptions,
) -> Result<ParseResultVerbose, Error> {
    let mut metrics = RunMetrics::default();

    let (parsers, compile) = timed(|| compile_with(source, options));
    metrics.compile = compile;
    let parsers = parsers?;

    let scanner = Scanner::new(input);
    let ((outcome, stats), parse) = timed(|| parsers.run(rule, &scanner));
    metrics.parse = parse;
    metrics.record_stats(stats);

    let (ast, unparsed) = match &outcome {
        Ok(tree) => {
            let (ast, unparsed) = post_process(&parsers, rule, tree, &mut metrics);
            (Some(ast), Some(unparsed))
        }
        Err(_) => (None, None),
    };

    let details = ParseDetails { rules: parsers.rule_names().map(str::to_string).collect(), metrics };
    Ok(ParseResultVerbose {
        text: input.to_string(),
        rule: rule.to_string(),
        outcome,
        ast,
        unparsed,
        elapsed: details.metrics.total(),
        details,
    })
}

/// Bridge and unparse a tree of `rule`, timing the bridge.
fn post_process(
    parsers: &Parsers,
    rule: &str,
    tree: &TreeElement,
    metrics: &mut RunMetrics,
) -> (Result<Branch, Error>, Result<String, Error>) {
    let (ast, bridge) = timed(|| parsers.to_ast(rule, tree));
    metrics.bridge = bridge;
    if let Err(err) = &ast {
        tracing::debug!(rule, error = %err, "generic tree conversion failed");
    }
    (ast, parsers.unparse(rule, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GrammarError, ViolationKind};
    use pretty_assertions::assert_eq;

    const CALC: &str = r#"
        .wrapRE -> /{\s*()\s*};
        expr    -> @:op=/{[-+]} > @:op=/{[*/]} > "(" expr ")" | n=/{\d+};
    "#;

    #[test]
    fn compile_reads_grammar_source() {
        let parsers = compile(CALC).unwrap();
        assert_eq!(parsers.rule_names().collect::<Vec<_>>(), vec!["expr", "expr@1", "expr@2"]);
        assert!(parsers.parse("expr", " 1 + 2 * (3 - 4) ").is_ok());
        assert!(matches!(parsers.parse("expr", "1 +"), Err(Error::UnconsumedInput { .. })));
    }

    #[test]
    fn compile_with_reports_source_and_grammar_errors() {
        let opts = CompileOptions::default().filename("broken.parsnip");
        let err = compile_with(r#"a -> "x"; c -> ;"#, &opts).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, Error::UnconsumedInput { .. }));
        assert!(message.contains("broken.parsnip:1:11:"), "{message}");
        assert!(matches!(compile("a -> ;"), Err(Error::Parse(_))));

        match compile("a -> b;") {
            Err(Error::Grammar(GrammarError { violations })) => {
                assert!(violations.iter().any(|v| v.kind == ViolationKind::UnknownRule));
            }
            other => panic!("expected a grammar error, got {other:?}"),
        }
        let left_recursive = r#"a -> a | "x";"#;
        assert!(compile(left_recursive).is_err());
        assert!(compile_with(left_recursive, &CompileOptions::default().validate(false)).is_ok());
    }

    #[test]
    fn parse_verbose_collects_tree_ast_and_metrics() {
        let res = parse_verbose(CALC, "expr", "1+2*3", &CompileOptions::default()).unwrap();

        assert_eq!(res.text, "1+2*3");
        assert_eq!(res.rule, "expr");
        assert!(res.outcome.is_ok());
        assert_eq!(res.unparsed.as_ref().and_then(|u| u.as_deref().ok()), Some("1+2*3"));
        assert_eq!(res.details.rules, vec!["expr", "expr@1", "expr@2"]);
        let ast = res.ast.as_ref().and_then(|ast| ast.as_ref().ok());
        assert_eq!(ast.and_then(|ast| ast.rule()), Some("expr"));
        assert_eq!(res.elapsed, res.details.metrics.total());
        assert!(res.details.metrics.attempts > 0);
    }

    #[test]
    fn parse_verbose_keeps_parse_failures_in_the_outcome() {
        let res = parse_verbose(CALC, "expr", "1+*", &CompileOptions::default()).unwrap();
        assert!(res.outcome.is_err());
        assert!(res.ast.is_none());
        assert!(res.unparsed.is_none());
        assert!(res.details.metrics.backtracks > 0);

        let res = parse_verbose(CALC, "nope", "1", &CompileOptions::default()).unwrap();
        assert!(matches!(res.outcome, Err(Error::UnknownRule(_))));

        assert!(parse_verbose("a -> ", "a", "", &CompileOptions::default()).is_err());
    }

    #[test]
    fn bridge_and_unparse_failures_are_reported() {
        let parsers = compile(CALC).unwrap();
        let mut metrics = RunMetrics::default();
        let stray = TreeElement::Empty;
        let (ast, unparsed) = post_process(&parsers, "expr", &stray, &mut metrics);
        assert!(matches!(ast, Err(Error::Structural(_))), "{ast:?}");
        assert!(matches!(unparsed, Err(Error::Structural(_))), "{unparsed:?}");

        let tree = parsers.parse("expr", "7").unwrap();
        let (ast, unparsed) = post_process(&parsers, "expr", &tree, &mut metrics);
        assert!(ast.is_ok());
        assert_eq!(unparsed.unwrap(), "7");
    }
}
