use parsnip::{Error, ParseResultVerbose, TreeElement};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

/// Which optional sections to print.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sections {
    pub ast: bool,
    pub unparse: bool,
    pub timing: bool,
}

/// Trees deeper than this are cut off with an ellipsis.
const MAX_DEPTH: usize = 64;

pub fn print_run(res: &ParseResultVerbose, sections: Sections, color: bool) {
    let palette = ansi::Palette::new(color);
    println!(
        "\n{}",
        palette.bold(palette.paint(format!("⚙  Parsing {:?} as {}", res.text, res.rule), ansi::CYAN))
    );

    match &res.outcome {
        Ok(tree) => {
            println!("\n{}", palette.paint("━━━ Tree ━━━", ansi::GRAY));
            print_tree(tree, 1, &palette);
        }
        Err(err) => {
            println!("\n{}", palette.paint("━━━ Error ━━━", ansi::GRAY));
            print_error(err, &res.details.rules, &palette);
        }
    }

    if sections.ast {
        println!("\n{}", palette.paint("━━━ Generic tree ━━━", ansi::GRAY));
        match &res.ast {
            Some(Ok(ast)) => println!("  {}", ast),
            Some(Err(err)) => print_failure(err, &palette),
            None => println!("{}", palette.dim("  No generic tree (the parse failed)")),
        }
    }

    if sections.unparse {
        println!("\n{}", palette.paint("━━━ Unparse ━━━", ansi::GRAY));
        match &res.unparsed {
            Some(Ok(text)) => println!("  {}", palette.paint(text, ansi::GREEN)),
            Some(Err(err)) => print_failure(err, &palette),
            None => println!("{}", palette.dim("  Nothing to unparse")),
        }
    }

    if sections.timing {
        let metrics = &res.details.metrics;
        println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
        println!(
            "  Total: {}  │  Compile: {}  │  Parse: {}  │  Bridge: {}",
            palette.paint(format!("{:?}", res.elapsed), ansi::GREEN),
            palette.paint(format!("{:?}", metrics.compile), ansi::CYAN),
            palette.paint(format!("{:?}", metrics.parse), ansi::CYAN),
            palette.dim(format!("{:?}", metrics.bridge)),
        );
        println!(
            "  {} {}  {} {}",
            palette.dim("attempts:"),
            palette.paint(metrics.attempts.to_string(), ansi::YELLOW),
            palette.dim("backtracks:"),
            palette.paint(metrics.backtracks.to_string(), ansi::YELLOW),
        );
    }
    println!();
}

fn print_tree(tree: &TreeElement, depth: usize, palette: &ansi::Palette) {
    let indent = "  ".repeat(depth);
    if depth > MAX_DEPTH {
        println!("{indent}{}", palette.dim("..."));
        return;
    }
    match tree {
        TreeElement::Scanner(s) => println!(
            "{indent}{} {}",
            palette.paint(s.offset().to_string(), ansi::YELLOW),
            palette.paint(format!("{:?}", s.as_str()), ansi::GREEN)
        ),
        TreeElement::Empty => println!("{indent}{}", palette.dim("(elided)")),
        TreeElement::Node(node) => {
            let extra = node.extra.map(|e| format!(" {e}")).unwrap_or_default();
            println!("{indent}{}{}", palette.paint(&node.tag, ansi::BLUE), palette.dim(extra));
            for child in &node.children {
                print_tree(child, depth + 1, palette);
            }
        }
    }
}

fn print_failure(err: &Error, palette: &ansi::Palette) {
    for line in err.to_string().lines() {
        println!("  {}", palette.paint(line, ansi::RED));
    }
}

fn print_error(err: &Error, rules: &[String], palette: &ansi::Palette) {
    print_failure(err, palette);
    match err {
        Error::UnconsumedInput { tree, .. } => {
            println!("\n{}", palette.paint("Matched prefix:", ansi::YELLOW));
            print_tree(tree, 1, palette);
        }
        Error::UnknownRule(_) => {
            println!("\n{}", palette.paint("Available rules:", ansi::YELLOW));
            for rule in rules {
                println!("  • {}", palette.paint(rule, ansi::CYAN));
            }
        }
        Error::Fatal(_) => {
            println!("\n{}", palette.dim("  A cutpoint was crossed; earlier alternatives were not retried."));
        }
        _ => {}
    }
}
