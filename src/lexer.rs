//! Grammar-driven tokenizer. There is no lexical grammar: token shapes come
//! from the grammar's literals and regexes, with maximal munch.

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::error::TokenizeError;
use crate::grammar::Grammar;
use crate::intern::Sym;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub sym: Sym,
    /// Signed offset to the matching bracket token (declared via
    /// `__BRACKET_PAIRS`), 0 otherwise. Lets guards skip bracketed spans.
    pub pair: isize,
}

pub fn tokenize(g: &mut Grammar, src: &str) -> Result<Vec<Token>, TokenizeError> {
    let literal_re = build_literal_regex(g);
    let mut tokens = Vec::new();

    let mut s = src;
    loop {
        // Whitespace and comments interleave arbitrarily.
        loop {
            let before = s.len();
            s = s.trim_start();
            s = skip_comments(g, s, src)?;
            if s.len() == before {
                break;
            }
        }
        if s.is_empty() {
            break;
        }

        let mut longest = 0;
        for re in &g.lexer_regexes {
            if let Some(m) = re.find(s) {
                longest = longest.max(m.len());
            }
        }
        if let Some(re) = &literal_re {
            if let Some(m) = re.find(s) {
                longest = longest.max(m.len());
            }
        }
        if longest == 0 {
            let offset = src.len() - s.len();
            return Err(TokenizeError::Stuck {
                offset,
                line: line_of(src, offset),
            });
        }

        let sym = g.interner.intern(&s[..longest]);
        tokens.push(Token { sym, pair: 0 });
        s = &s[longest..];
    }

    pair_brackets(g, &mut tokens)?;
    Ok(tokens)
}

/// Combine all grammar literals into one longest-first alternation regex.
fn build_literal_regex(g: &Grammar) -> Option<Regex> {
    if g.literals.is_empty() {
        return None;
    }
    let mut lits = g.literals.clone();
    lits.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = format!(
        r"\A(?:{})",
        lits.iter()
            .map(|l| regex::escape(l))
            .collect::<Vec<_>>()
            .join("|")
    );
    // Escaped literals always form a valid pattern.
    Some(Regex::new(&pattern).expect("literal regex"))
}

fn skip_comments<'a>(g: &Grammar, s: &'a str, src: &str) -> Result<&'a str, TokenizeError> {
    for opener in &g.line_comments {
        if s.starts_with(opener.as_str()) {
            return Ok(match s.find('\n') {
                Some(nl) => &s[nl + 1..],
                None => "",
            });
        }
    }
    for bc in &g.block_comments {
        if !s.starts_with(bc.open.as_str()) {
            continue;
        }
        let start_offset = src.len() - s.len();
        let mut rest = &s[bc.open.len()..];
        let mut depth = 1usize;
        while depth > 0 {
            let close_at = rest.find(bc.close.as_str());
            if bc.nested {
                let open_at = rest.find(bc.open.as_str());
                if let (Some(o), Some(c)) = (open_at, close_at) {
                    if o < c {
                        depth += 1;
                        rest = &rest[o + bc.open.len()..];
                        continue;
                    }
                }
            }
            match close_at {
                Some(c) => {
                    depth -= 1;
                    rest = &rest[c + bc.close.len()..];
                }
                None => {
                    return Err(TokenizeError::UnterminatedComment {
                        offset: start_offset,
                        line: line_of(src, start_offset),
                    })
                }
            }
        }
        return Ok(rest);
    }
    Ok(s)
}

/// Fill in `Token::pair` offsets for declared bracket pairs.
fn pair_brackets(g: &Grammar, tokens: &mut [Token]) -> Result<(), TokenizeError> {
    if g.bracket_pairs.is_empty() {
        return Ok(());
    }
    let closes: FxHashMap<Sym, Sym> = g.bracket_pairs.iter().map(|(o, c)| (*o, *c)).collect();
    let opens: FxHashMap<Sym, Sym> = g.bracket_pairs.iter().map(|(o, c)| (*c, *o)).collect();

    let mut stack: Vec<(Sym, usize)> = Vec::new();
    for i in 0..tokens.len() {
        let sym = tokens[i].sym;
        if closes.contains_key(&sym) {
            stack.push((sym, i));
        } else if let Some(expected_open) = opens.get(&sym) {
            match stack.pop() {
                Some((open_sym, open_idx)) if open_sym == *expected_open => {
                    tokens[open_idx].pair = (i - open_idx) as isize;
                    tokens[i].pair = -((i - open_idx) as isize);
                }
                _ => {
                    return Err(TokenizeError::UnbalancedBracket {
                        text: g.interner.resolve(sym).to_string(),
                        index: i,
                    })
                }
            }
        }
    }
    if let Some((sym, idx)) = stack.pop() {
        return Err(TokenizeError::UnbalancedBracket {
            text: g.interner.resolve(sym).to_string(),
            index: idx,
        });
    }
    Ok(())
}

fn line_of(src: &str, offset: usize) -> usize {
    src[..offset].matches('\n').count() + 1
}
