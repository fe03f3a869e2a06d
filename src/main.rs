use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use grampus::cli::{AstFormat, CheckArgs, Cli, Commands, ParseArgs, TokenFormat, TokensArgs};
use grampus::config;
use grampus::engine::{self, Outcome};
use grampus::grammar::Grammar;
use grampus::lexer::tokenize;
use grampus::output::{self, json, terminal};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        None => Ok(()),
        Some(Commands::Check(args)) => check(args),
        Some(Commands::Tokens(args)) => tokens(args),
        Some(Commands::Parse(args)) => parse(args),
    }
}

fn load_grammar(path: &Path) -> Result<Grammar> {
    Grammar::from_file(&config::expand_tilde(path))
        .with_context(|| format!("failed to compile grammar {}", path.display()))
}

fn check(args: CheckArgs) -> Result<()> {
    args.validate()?;
    if args.no_color {
        colored::control::set_override(false);
    }
    let g = load_grammar(&args.grammar)?;
    let root = args
        .root
        .clone()
        .unwrap_or_else(|| g.root_rule().to_string());
    let root_id = g
        .rule_id(&root)
        .with_context(|| format!("root rule {root} is not defined"))?;

    let kind = if g.is_annotated() { "annotated" } else { "pure BNF" };
    println!(
        "{}: {} rules ({kind}), {} literal tokens, {} token regexes, root {}",
        args.grammar.display(),
        g.rules.len(),
        g.literals.len(),
        g.lexer_regexes.len(),
        root.cyan(),
    );
    let unreachable = g.unreachable_rules(root_id);
    for name in &unreachable {
        println!(
            "{} rule {name} is unreachable from {root}",
            "warning:".yellow().bold()
        );
    }
    if unreachable.is_empty() {
        println!("{}", "ok".green());
    }
    Ok(())
}

fn tokens(args: TokensArgs) -> Result<()> {
    args.validate()?;
    let mut g = load_grammar(&args.grammar)?;
    let src = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let toks = tokenize(&mut g, &src).context("tokenization failed")?;

    let mut w = output::writer(args.output.as_deref())?;
    match args.format {
        TokenFormat::Plain => terminal::write_tokens(&mut *w, &toks, &g.interner)?,
        TokenFormat::Jsonl => {
            for (i, t) in toks.iter().enumerate() {
                serde_json::to_writer(&mut *w, &json::token_value(i, t, &g.interner))?;
                writeln!(w)?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

fn parse(args: ParseArgs) -> Result<()> {
    args.validate()?;
    let cfg = config::load_config();
    if args.no_color || cfg.no_color || args.output.is_some() {
        colored::control::set_override(false);
    }

    let mut g = load_grammar(&args.grammar)?;
    let src = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let toks = tokenize(&mut g, &src).context("tokenization failed")?;

    let root = args
        .root
        .clone()
        .unwrap_or_else(|| g.root_rule().to_string());
    let engine_choice = args.engine.unwrap_or_else(|| cfg.engine());
    let depth_limit = args.depth_limit.or(cfg.depth_limit);
    if args.verbose > 0 {
        eprintln!(
            "{} tokens, engine {engine_choice}, root {root}",
            toks.len()
        );
    }

    let outcome = engine::run(
        engine_choice,
        &g,
        &root,
        &toks,
        Default::default(),
        depth_limit,
    )
    .context("parse failed")?;

    let mut w = output::writer(args.output.as_deref())?;
    match outcome {
        Outcome::Tree(ast) => match args.format {
            AstFormat::Tree => terminal::write_tree(&mut *w, &ast, &g.interner)?,
            AstFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, &json::ast_value(&ast, &g.interner))?;
                writeln!(w)?;
            }
        },
        Outcome::Recognized => {
            writeln!(w, "recognized: {} tokens", toks.len())?;
        }
    }
    w.flush()?;
    Ok(())
}
