mod debug_report;

use debug_report::Sections;
use parsnip::{CompileOptions, parse_verbose};
use std::io::{self, IsTerminal, Read};

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    init_tracing();

    let source = match std::fs::read_to_string(&config.grammar_file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: failed to read grammar '{}': {err}", config.grammar_file);
            std::process::exit(2);
        }
    };

    let opts = CompileOptions::default().auto_cutpoints(config.auto_cutpoints).filename(&config.grammar_file);
    let res = match parse_verbose(&source, &config.rule, &config.input, &opts) {
        Ok(res) => res,
        Err(err) => {
            eprintln!("error: grammar '{}' did not compile\n{err}", config.grammar_file);
            std::process::exit(1);
        }
    };
    debug_report::print_run(&res, config.sections, config.color);
    if res.outcome.is_err() {
        std::process::exit(1);
    }
}

/// Log to stderr, only when `RUST_LOG` asks for it.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();
}

struct CliConfig {
    grammar_file: String,
    rule: String,
    input: String,
    sections: Sections,
    auto_cutpoints: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut input: Option<String> = None;
    let mut sections = Sections::default();
    let mut auto_cutpoints = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("parsnip {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--ast" => sections.ast = true,
            "--unparse" => sections.unparse = true,
            "--timing" => sections.timing = true,
            "--auto-cutpoints" => auto_cutpoints = true,
            "--color" => color = true,
            "--no-color" => color = false,
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                set_input(&mut input, value)?;
            }
            "--" => {
                positional.extend(args.by_ref());
                break;
            }
            _ if arg.starts_with("--input=") => {
                set_input(&mut input, arg.trim_start_matches("--input=").to_string())?;
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let (Some(grammar_file), Some(rule)) = (positional.next(), positional.next()) else {
        return Err(format!("error: expected a grammar file and a rule name\n\n{}", help_text()));
    };
    let rest: Vec<String> = positional.collect();
    if !rest.is_empty() {
        set_input(&mut input, rest.join(" "))?;
    }

    let input = match input {
        Some(value) => value,
        None => read_stdin_input()?,
    };

    Ok(CliConfig { grammar_file, rule, input, sections, auto_cutpoints, color })
}

fn set_input(input: &mut Option<String>, value: String) -> Result<(), String> {
    if input.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *input = Some(value);
    Ok(())
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "parsnip {version}

Compile a grammar and parse input with one of its rules.

Usage:
  parsnip [OPTIONS] <grammar-file> <rule> [--] <input...>
  parsnip [OPTIONS] <grammar-file> <rule> --input <text>
  parsnip [OPTIONS] <grammar-file> <rule> < input.txt

Options:
  -i, --input <text>         Input text to parse. If omitted, reads remaining args
                             or stdin when no args are provided.
  --ast                      Print the generic tree.
  --unparse                  Print the tree written back out as text.
  --timing                   Print compile/parse/bridge timings and counters.
  --auto-cutpoints           Insert cutpoints around literals used only once.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Log filter, e.g. RUST_LOG=parsnip=trace.

Exit codes:
  0  Success.
  1  The grammar did not compile or the input did not parse.
  2  Invalid arguments or unreadable grammar file.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
