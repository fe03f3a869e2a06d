//! Exhaustive backtracking search. Tries every derivation, resuming failed
//! subtrees at their next alternation, so it finds a parse whenever one
//! exists within the depth limit. Exponential in the worst case; a reentry
//! cap keeps left recursion from diverging and a validity memo prunes
//! known-dead (rule, position) pairs.

use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::grammar::{Grammar, Term};
use crate::intern::Sym;
use crate::lexer::Token;

#[derive(Clone, Debug, Default)]
pub struct SearchNode {
    pub sym: Sym,
    pub children: Option<Vec<Box<SearchNode>>>,
    pub token_start: usize,
    pub token_count: usize,
    pub rule_id: usize,
    /// Which alternation produced this node; backtracking resumes from the
    /// next one.
    pub alt_id: usize,
}

impl SearchNode {
    fn leaf(sym: Sym, token_start: usize) -> Self {
        Self {
            sym,
            children: None,
            token_start,
            token_count: 1,
            rule_id: 0,
            alt_id: 0,
        }
    }
}

// Trees can be deeply recursive, so destruction must not recurse. Collect
// all transitive children into self.
impl Drop for SearchNode {
    fn drop(&mut self) {
        if let Some(collected) = self.children.as_mut() {
            let mut i = 0;
            while i < collected.len() {
                if let Some(mut c) = collected[i].children.take() {
                    collected.append(&mut c);
                }
                i += 1;
            }
        }
    }
}

/// Where to pick up a previously-found subtree: skip to `alt`, restore the
/// children built so far, and if `failing`, advance past the last parse
/// instead of repeating it.
#[derive(Default)]
struct Resume {
    alt: usize,
    children: Vec<Box<SearchNode>>,
    at: usize,
    failing: bool,
}

/// Parse `tokens` from `root`, requiring full consumption. The search
/// backtracks through every derivation before giving up; one stack frame is
/// live per open rule, so derivation depth is limited like descent's.
pub fn parse(
    g: &Grammar,
    root: &str,
    tokens: &[Token],
    depth_limit: Option<usize>,
) -> Result<Box<SearchNode>, ParseError> {
    let root_id = g
        .rule_id(root)
        .ok_or_else(|| ParseError::RuleNotFound { name: root.to_string() })?;
    let limit = depth_limit.unwrap_or(super::default_depth_limit());
    let mut reentries = FxHashMap::default();
    let mut validity = FxHashMap::default();
    let resume = Resume { at: 0, ..Default::default() };
    match search(&mut reentries, &mut validity, g, root_id, tokens, 0, limit, resume)? {
        Some(node) if node.token_count == tokens.len() => Ok(node),
        Some(node) => Err(ParseError::Incomplete {
            token_index: node.token_count,
            total: tokens.len(),
        }),
        None => Err(ParseError::NoAlternative {
            rule: g.rules[root_id].name.clone(),
            token_index: 0,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn search(
    reentries: &mut FxHashMap<(usize, usize), usize>,
    validity: &mut FxHashMap<(usize, usize), bool>,
    g: &Grammar,
    rule_id: usize,
    tokens: &[Token],
    depth: usize,
    limit: usize,
    mut resume: Resume,
) -> Result<Option<Box<SearchNode>>, ParseError> {
    if depth > limit {
        return Err(ParseError::DepthLimit { limit });
    }
    let key = (rule_id, resume.at);
    // Known-dead (rule, position) pairs cannot match on any path. This only
    // dampens the exponential blowup, it does not remove it.
    if !*validity.entry(key).or_insert(true) {
        return Ok(None);
    }
    // More re-entries at one position than tokens plus two cannot be a
    // productive left recursion. Checked before incrementing, so failure
    // paths need no decrement.
    let count = reentries.entry(key).or_insert(0);
    if *count > tokens.len() + 2 {
        return Ok(None);
    }
    *count += 1;

    let rule = &g.rules[rule_id];
    let was_first_entry = !resume.failing;
    let start = resume.at;

    for (alt_id, alt) in rule.alts.iter().enumerate() {
        if alt_id < resume.alt {
            continue;
        }
        let mut c = std::mem::take(&mut resume.children);
        let mut i = start;

        let mut failed = false;
        if resume.failing {
            failed = true;
            resume.failing = false;
        }
        while c.len() < alt.terms.len() || failed {
            let mut child_resume = Resume { at: i, ..Default::default() };
            if failed {
                // Unwind leaves, then reopen the deepest rule node at its
                // next alternation.
                while let Some(last) = c.last() {
                    if last.children.is_some() {
                        break;
                    }
                    i = last.token_start;
                    c.pop();
                }
                let Some(mut child) = c.pop() else {
                    break;
                };
                child_resume.alt = child.alt_id;
                child_resume.children = child.children.take().unwrap_or_default();
                i = child.token_start;
                child_resume.at = i;
                child_resume.failing = true;
            }
            if c.len() >= alt.terms.len() {
                failed = true;
                continue;
            }
            failed = false;

            let clen_start = c.len();
            match &alt.terms[c.len()] {
                Term::Rule(id) => {
                    if let Some(child) =
                        search(reentries, validity, g, *id, tokens, depth + 1, limit, child_resume)?
                    {
                        i += child.token_count;
                        c.push(child);
                    }
                }
                Term::Literal(sym) => {
                    if i < tokens.len() && tokens[i].sym == *sym {
                        c.push(Box::new(SearchNode::leaf(tokens[i].sym, i)));
                        i += 1;
                    }
                }
                Term::Regex(re) => {
                    if i < tokens.len() && re.is_match_sym(tokens[i].sym, &g.interner) {
                        c.push(Box::new(SearchNode::leaf(tokens[i].sym, i)));
                        i += 1;
                    }
                }
                _ => {}
            }
            if c.len() == clen_start {
                failed = true;
            }
            // The root must consume the whole input; a shorter parse is a
            // failure to backtrack out of, not an answer.
            if c.len() == alt.terms.len() && depth == 0 && i < tokens.len() {
                failed = true;
            }
        }
        if failed {
            continue;
        }

        if let Some(n) = reentries.get_mut(&key) {
            *n -= 1;
        }
        return Ok(Some(Box::new(SearchNode {
            sym: rule.sym,
            children: Some(c),
            token_start: start,
            token_count: i - start,
            rule_id,
            alt_id,
        })));
    }

    if let Some(n) = reentries.get_mut(&key) {
        *n -= 1;
    }
    if was_first_entry {
        validity.insert(key, false);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(grammar: &str, input: &str) -> Result<(Grammar, Box<SearchNode>), ParseError> {
        let mut g = Grammar::from_str(grammar).unwrap();
        let tokens = tokenize(&mut g, input).unwrap();
        let root = g.root_rule().to_string();
        let node = parse(&g, &root, &tokens, None)?;
        Ok((g, node))
    }

    #[test]
    fn backtracks_out_of_greedy_matches() {
        // A greedy A would swallow all three tokens and doom the trailing
        // "a"; the search must retry A with a shorter parse.
        let grammar = r#"
S ::= A "a"
A ::= "a" A | "a"
"#;
        let (g, node) = parse_str(grammar, "a a a").unwrap();
        assert_eq!(node.token_count, 3);
        let children = node.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(g.interner.resolve(children[0].sym), "A");
        assert_eq!(children[0].token_count, 2);
    }

    #[test]
    fn left_recursion_terminates_via_reentry_cap() {
        let grammar = r#"
E ::= E "+" n | n
n ::= rx%[0-9]+%rx
"#;
        let (_, node) = parse_str(grammar, "1 + 2 + 3").unwrap();
        assert_eq!(node.token_count, 5);

        let err = parse_str(grammar, "1 +").unwrap_err();
        assert!(matches!(err, ParseError::NoAlternative { .. }));
    }

    #[test]
    fn validity_memo_keeps_blowup_grammars_tractable() {
        let grammar = r#"
S ::= AX S | AX
AX ::= A "x"
A ::= A A | "a"
"#;
        let (_, node) = parse_str(grammar, "a x a a x").unwrap();
        assert_eq!(node.token_count, 5);
        let err = parse_str(grammar, "a x a a").unwrap_err();
        assert!(matches!(err, ParseError::NoAlternative { .. }));
    }

    #[test]
    fn records_which_alternation_matched() {
        let grammar = r#"S ::= "a" | "b""#;
        let (_, node) = parse_str(grammar, "b").unwrap();
        assert_eq!(node.alt_id, 1);
    }

    #[test]
    fn deep_results_drop_without_overflow() {
        let grammar = "S ::= \"a\" S | \"a\"";
        let input = "a ".repeat(250);
        let (_, node) = parse_str(grammar, &input).unwrap();
        assert_eq!(node.token_count, 250);
        drop(node);
    }

    #[test]
    fn depth_limit_is_an_error_not_a_crash() {
        // Right recursion needs one live frame per token; without the bound
        // this input blows the thread stack instead of returning.
        let grammar = "S ::= \"a\" S | \"a\"";
        let input = "a ".repeat(2_000);
        let mut g = Grammar::from_str(grammar).unwrap();
        let tokens = tokenize(&mut g, &input).unwrap();

        let err = parse(&g, "S", &tokens, None).unwrap_err();
        assert!(matches!(err, ParseError::DepthLimit { .. }));

        let err = parse(&g, "S", &tokens, Some(64)).unwrap_err();
        assert!(matches!(err, ParseError::DepthLimit { limit: 64 }));
    }
}
