//! Grammar workbench: annotated BNF grammars, grammar-driven tokenization,
//! and interchangeable parsing engines.
//!
//! A grammar file defines both the token shapes (its literals and `rx%...%rx`
//! regexes) and the language structure, so there is no separate lexical grammar.
//! Four engines share that grammar: predicated recursive descent (the
//! default, with guards, hooks, and error recovery), an Earley recognizer,
//! a packrat parser, and an exhaustive backtracking search.
//!
//! ```
//! use grampus::engine::{self, Engine, Outcome};
//! use grampus::grammar::Grammar;
//! use grampus::lexer::tokenize;
//!
//! let mut g = Grammar::from_str("list ::= @eof | @auto rx%[a-z]+%rx $become list").unwrap();
//! let tokens = tokenize(&mut g, "alpha beta").unwrap();
//! let outcome = engine::run(Engine::Descent, &g, "list", &tokens, Default::default(), None);
//! assert!(matches!(outcome, Ok(Outcome::Tree(_))));
//! ```

pub mod ast;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod intern;
pub mod lexer;
pub mod output;
