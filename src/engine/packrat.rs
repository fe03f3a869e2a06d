//! Packrat parser: ordered choice with a (rule, position) memo table.
//! Linear time on pure BNF grammars; left recursion is memoized as failure
//! rather than looping forever.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ParseError;
use crate::grammar::{Grammar, Term};
use crate::intern::Sym;
use crate::lexer::Token;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackratNode {
    pub sym: Sym,
    pub children: Option<Vec<Rc<RefCell<PackratNode>>>>,
    pub token_start: usize,
    pub token_count: usize,
}

// Trees can be deeply recursive, so destruction must not recurse. Collect
// all transitive children into self; shared memoized subtrees survive until
// their last owner.
impl Drop for PackratNode {
    fn drop(&mut self) {
        if let Some(collected) = self.children.as_mut() {
            let mut i = 0;
            while i < collected.len() {
                let c = collected[i]
                    .borrow_mut()
                    .children
                    .as_mut()
                    .map(std::mem::take);
                if let Some(mut c) = c {
                    collected.append(&mut c);
                }
                i += 1;
            }
        }
    }
}

type NodeRef = Rc<RefCell<PackratNode>>;
type Memo = FxHashMap<(usize, usize), Option<NodeRef>>;

/// Parse `tokens` from `root`, requiring full consumption.
pub fn parse(g: &Grammar, root: &str, tokens: &[Token]) -> Result<NodeRef, ParseError> {
    let root_id = g
        .rule_id(root)
        .ok_or_else(|| ParseError::RuleNotFound { name: root.to_string() })?;
    let node = parse_impl(g, root_id, tokens)?;
    let count = node.borrow().token_count;
    if count != tokens.len() {
        return Err(ParseError::Incomplete {
            token_index: count,
            total: tokens.len(),
        });
    }
    Ok(node)
}

// Worklist rendition of the recursive packrat algorithm: the stash holds
// suspended parent frames while a child rule runs.
fn parse_impl(g: &Grammar, root_id: usize, tokens: &[Token]) -> Result<NodeRef, ParseError> {
    struct Frame<'a> {
        children: Vec<NodeRef>,
        alts: &'a [crate::grammar::Alternation],
        terms: &'a [Term],
        rule_id: usize,
        token_start: usize,
        token_i: usize,
        alt_i: usize,
        term_i: usize,
    }
    impl Frame<'_> {
        fn memo_key(&self) -> (usize, usize) {
            (self.rule_id, self.token_start)
        }
    }

    let mut memo: Memo = Memo::default();
    let mut work_started: FxHashSet<(usize, usize)> = FxHashSet::default();

    let root_alts = &g.rules[root_id].alts;
    let mut ctx = Frame {
        children: Vec::new(),
        terms: &root_alts[0].terms,
        alts: root_alts,
        rule_id: root_id,
        token_start: 0,
        token_i: 0,
        alt_i: 0,
        term_i: 0,
    };

    let mut stash: Vec<Frame> = Vec::new();

    let live = |ctx: &Frame| {
        ctx.alt_i < ctx.alts.len() && ctx.term_i < ctx.terms.len() && ctx.token_i <= tokens.len()
    };

    while live(&ctx) || !stash.is_empty() {
        if ctx.alt_i == 0 && ctx.term_i == 0 {
            work_started.insert(ctx.memo_key());
        }
        if !stash.is_empty() && !live(&ctx) {
            // The current rule matched; memoize it and resume the parent,
            // whose pending Rule term will now hit the memo.
            memo.insert(
                ctx.memo_key(),
                Some(Rc::new(RefCell::new(PackratNode {
                    sym: g.rules[ctx.rule_id].sym,
                    children: Some(ctx.children.clone()),
                    token_start: ctx.token_start,
                    token_count: ctx.token_i - ctx.token_start,
                }))),
            );
            ctx = stash.pop().ok_or_else(stash_underflow)?;
            continue;
        }

        let term = &ctx.terms[ctx.term_i];
        if let Term::Rule(id) = term {
            if !memo.contains_key(&(*id, ctx.token_i)) {
                let token_i = ctx.token_i;
                let alts = &g.rules[*id].alts;
                stash.push(ctx);
                ctx = Frame {
                    children: Vec::new(),
                    terms: &alts[0].terms,
                    alts,
                    rule_id: *id,
                    token_start: token_i,
                    token_i,
                    alt_i: 0,
                    term_i: 0,
                };
                if work_started.contains(&ctx.memo_key()) {
                    // Left recursion: memoize as failure so the suspended
                    // ancestor falls through to its next alternation.
                    memo.insert(ctx.memo_key(), None);
                    ctx = stash.pop().ok_or_else(stash_underflow)?;
                }
                continue;
            }
        }

        let old_childcount = ctx.children.len();
        let mut token_match = false;
        match term {
            Term::Rule(id) => {
                if let Some(Some(child)) = memo.get(&(*id, ctx.token_i)) {
                    let child = Rc::clone(child);
                    ctx.token_i += child.borrow().token_count;
                    ctx.children.push(child);
                }
            }
            Term::Literal(sym) => {
                token_match = ctx.token_i < tokens.len() && tokens[ctx.token_i].sym == *sym;
            }
            Term::Regex(re) => {
                token_match = ctx.token_i < tokens.len()
                    && re.is_match_sym(tokens[ctx.token_i].sym, &g.interner);
            }
            _ => {}
        }
        if token_match {
            ctx.children.push(Rc::new(RefCell::new(PackratNode {
                sym: tokens[ctx.token_i].sym,
                children: None,
                token_start: ctx.token_i,
                token_count: 1,
            })));
            ctx.token_i += 1;
        }

        ctx.term_i += 1;
        if ctx.children.len() == old_childcount {
            // Term failed; rewind and try the next alternation.
            ctx.term_i = 0;
            ctx.token_i = ctx.token_start;
            ctx.children.clear();
            ctx.alt_i += 1;
            if ctx.alt_i >= ctx.alts.len() {
                if let Some(parent) = stash.pop() {
                    memo.insert(ctx.memo_key(), None);
                    ctx = parent;
                    continue;
                }
                return Err(ParseError::NoAlternative {
                    rule: g.rules[root_id].name.clone(),
                    token_index: 0,
                });
            }
            ctx.terms = &ctx.alts[ctx.alt_i].terms;
        }
    }

    Ok(Rc::new(RefCell::new(PackratNode {
        sym: g.rules[ctx.rule_id].sym,
        children: Some(ctx.children),
        token_start: ctx.token_start,
        token_count: ctx.token_i - ctx.token_start,
    })))
}

fn stash_underflow() -> ParseError {
    ParseError::NoAlternative {
        rule: "<internal: empty frame stash>".to_string(),
        token_index: 0,
    }
}
