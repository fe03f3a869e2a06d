use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::engine::Engine;

#[derive(Parser, Debug)]
#[command(name = "grampus")]
#[command(
    about = "Grammar workbench: compile annotated BNF grammars, tokenize inputs, and parse with interchangeable engines"
)]
#[command(version = "0.3.1")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a grammar and report diagnostics
    Check(CheckArgs),

    /// Tokenize an input file with a grammar's terminals
    Tokens(TokensArgs),

    /// Parse an input file and render the syntax tree
    Parse(ParseArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Grammar file (annotated BNF)
    #[arg(required = true)]
    pub grammar: PathBuf,

    /// Root rule for reachability diagnostics (default: first rule)
    #[arg(long, value_name = "RULE")]
    pub root: Option<String>,

    /// Disable colored terminal output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Parser, Debug)]
pub struct TokensArgs {
    /// Input file to tokenize
    #[arg(required = true)]
    pub input: PathBuf,

    /// Grammar file (annotated BNF)
    #[arg(short, long, value_name = "FILE")]
    pub grammar: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "plain")]
    pub format: TokenFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Input file to parse
    #[arg(required = true)]
    pub input: PathBuf,

    /// Grammar file (annotated BNF)
    #[arg(short, long, value_name = "FILE")]
    pub grammar: PathBuf,

    /// Root rule (default: first rule in the grammar)
    #[arg(long, value_name = "RULE")]
    pub root: Option<String>,

    /// Parsing engine (default: from config, then descent)
    #[arg(long, value_enum)]
    pub engine: Option<Engine>,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    pub format: AstFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Recursion depth limit for the descent and exhaustive engines
    #[arg(long, value_name = "N")]
    pub depth_limit: Option<usize>,

    /// Disable colored terminal output
    #[arg(long)]
    pub no_color: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TokenFormat {
    Plain,
    Jsonl,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AstFormat {
    Tree,
    Json,
}

impl CheckArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.grammar.exists() {
            anyhow::bail!("Grammar file does not exist: {}", self.grammar.display());
        }
        Ok(())
    }
}

impl TokensArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.grammar.exists() {
            anyhow::bail!("Grammar file does not exist: {}", self.grammar.display());
        }
        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }
        Ok(())
    }
}

impl ParseArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.grammar.exists() {
            anyhow::bail!("Grammar file does not exist: {}", self.grammar.display());
        }
        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }
        if let Some(limit) = self.depth_limit {
            if limit == 0 {
                anyhow::bail!("Depth limit must be at least 1");
            }
        }
        Ok(())
    }
}
