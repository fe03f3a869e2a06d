//! Interchangeable parsing engines over one grammar and token stream.
//!
//! `descent` is the featureful default: predicates, guards, hooks, error
//! recovery. The other three take pure BNF only; `earley` recognizes
//! (ambiguity and left recursion included) without building a tree,
//! `packrat` parses in linear time with ordered choice, and `exhaustive`
//! searches every derivation.

pub mod descent;
pub mod earley;
pub mod exhaustive;
pub mod packrat;

use std::fmt;

use crate::ast::AstNode;
use crate::error::ParseError;
use crate::grammar::Grammar;
use crate::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Engine {
    Descent,
    Earley,
    Packrat,
    Exhaustive,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Descent => "descent",
            Engine::Earley => "earley",
            Engine::Packrat => "packrat",
            Engine::Exhaustive => "exhaustive",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "descent" => Ok(Engine::Descent),
            "earley" => Ok(Engine::Earley),
            "packrat" => Ok(Engine::Packrat),
            "exhaustive" => Ok(Engine::Exhaustive),
            other => Err(format!(
                "unknown engine '{other}' (expected descent, earley, packrat, or exhaustive)"
            )),
        }
    }
}

/// What an engine produces. Earley only answers membership.
#[derive(Debug)]
pub enum Outcome {
    Tree(AstNode),
    Recognized,
}

/// Default recursion bound for the descent and exhaustive engines. Debug
/// builds have larger stack frames, so the bound is lower there.
pub(crate) const fn default_depth_limit() -> usize {
    if cfg!(debug_assertions) {
        300
    } else {
        1500
    }
}

/// Run `engine` over an already-tokenized input, requiring full consumption.
/// Engines other than descent reject annotated grammars up front.
pub fn run(
    engine: Engine,
    g: &Grammar,
    root: &str,
    tokens: &[Token],
    callbacks: descent::Callbacks,
    depth_limit: Option<usize>,
) -> Result<Outcome, ParseError> {
    if engine != Engine::Descent && g.is_annotated() {
        return Err(ParseError::UnsupportedGrammar {
            engine: engine.to_string(),
        });
    }
    match engine {
        Engine::Descent => {
            descent::parse(g, root, tokens, callbacks, depth_limit).map(Outcome::Tree)
        }
        Engine::Earley => earley::recognize(g, root, tokens).map(|()| Outcome::Recognized),
        Engine::Packrat => packrat::parse(g, root, tokens).map(|n| Outcome::Tree(from_packrat(&n))),
        Engine::Exhaustive => {
            exhaustive::parse(g, root, tokens, depth_limit).map(|n| Outcome::Tree(from_search(&n)))
        }
    }
}

fn from_packrat(node: &std::rc::Rc<std::cell::RefCell<packrat::PackratNode>>) -> AstNode {
    let n = node.borrow();
    match &n.children {
        Some(children) => AstNode::new(
            Some(children.iter().map(from_packrat).collect()),
            n.token_count as u32,
            n.sym,
        ),
        None => AstNode::leaf(n.sym),
    }
}

fn from_search(node: &exhaustive::SearchNode) -> AstNode {
    match &node.children {
        Some(children) => AstNode::new(
            Some(children.iter().map(|c| from_search(c)).collect()),
            node.token_count as u32,
            node.sym,
        ),
        None => AstNode::leaf(node.sym),
    }
}
