//! Line-oriented reader for the annotated BNF text format.
//!
//! Produces raw rules (term strings still carrying their `"`/`rx%`/`@`/`$`
//! markers); classification and validation happen in [`super::compile`].

use crate::error::GrammarError;

#[derive(Debug, Clone)]
pub struct RawRule {
    pub name: String,
    pub alts: Vec<Vec<String>>,
    /// Source line the rule definition started on (1-based).
    pub line: usize,
}

#[derive(Debug, PartialEq)]
enum Ev {
    Sep,
    Pipe,
    Word(String),
}

pub fn parse_bnf(input: &str) -> Result<Vec<RawRule>, GrammarError> {
    let mut rules: Vec<RawRule> = Vec::new();

    for (lineno, text) in logical_lines(input) {
        let evs = scan_line(&text, lineno)?;
        if evs.is_empty() {
            continue;
        }

        // A line is a new rule definition iff it reads `name ::= ...`.
        // Anything else continues the rule above it.
        let starts_rule = matches!(evs.get(1), Some(Ev::Sep));
        if starts_rule {
            let name = match &evs[0] {
                Ev::Word(w) if is_plain_name(w) => w.clone(),
                _ => return Err(GrammarError::MissingName { line: lineno }),
            };
            rules.push(RawRule {
                name,
                alts: vec![Vec::new()],
                line: lineno,
            });
            feed(&mut rules.last_mut().unwrap().alts, &evs[2..], lineno)?;
        } else {
            if matches!(evs.first(), Some(Ev::Sep)) {
                return Err(GrammarError::MissingName { line: lineno });
            }
            let rule = rules
                .last_mut()
                .ok_or(GrammarError::MissingSeparator { line: lineno })?;
            feed(&mut rule.alts, &evs, lineno)?;
        }
    }

    if rules.is_empty() {
        return Err(GrammarError::Empty);
    }
    Ok(rules)
}

fn feed(alts: &mut Vec<Vec<String>>, evs: &[Ev], line: usize) -> Result<(), GrammarError> {
    for ev in evs {
        match ev {
            Ev::Sep => return Err(GrammarError::UnexpectedSeparator { line }),
            Ev::Pipe => alts.push(Vec::new()),
            Ev::Word(w) => alts.last_mut().unwrap().push(w.clone()),
        }
    }
    Ok(())
}

fn is_plain_name(w: &str) -> bool {
    !w.is_empty() && !w.starts_with('"') && !w.starts_with("rx%") && !w.starts_with('@')
        && !w.starts_with('!')
        && !w.starts_with('$')
}

/// Join trailing-backslash continuations, keeping 1-based line numbers.
fn logical_lines(input: &str) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (i, raw) in input.lines().enumerate() {
        let lineno = i + 1;
        let continued = raw.trim_end().ends_with('\\');
        let body = if continued {
            let t = raw.trim_end();
            &t[..t.len() - 1]
        } else {
            raw
        };
        match pending.take() {
            Some((start, mut acc)) => {
                acc.push_str(body);
                if continued {
                    pending = Some((start, acc));
                } else {
                    out.push((start, acc));
                }
            }
            None => {
                if continued {
                    pending = Some((lineno, body.to_string()));
                } else {
                    out.push((lineno, raw.to_string()));
                }
            }
        }
    }
    if let Some(p) = pending {
        out.push(p);
    }
    out
}

fn scan_line(line: &str, lineno: usize) -> Result<Vec<Ev>, GrammarError> {
    let mut evs = Vec::new();
    let mut rest = line;
    while !rest.is_empty() {
        let c = rest.chars().next().unwrap();
        if c.is_whitespace() {
            rest = rest.trim_start();
        } else if c == '#' {
            break;
        } else if rest.starts_with("::=") {
            evs.push(Ev::Sep);
            rest = &rest[3..];
        } else if c == '|' {
            evs.push(Ev::Pipe);
            rest = &rest[1..];
        } else if c == '"' {
            let len = scan_literal(rest).ok_or(GrammarError::UnterminatedLiteral { line: lineno })?;
            evs.push(Ev::Word(rest[..len].to_string()));
            rest = &rest[len..];
        } else if rest.starts_with("rx%") {
            let len = scan_rx(rest).ok_or(GrammarError::UnterminatedRegex { line: lineno })?;
            evs.push(Ev::Word(rest[..len].to_string()));
            rest = &rest[len..];
        } else if c == '@' || c == '!' || c == '$' {
            let len = scan_annotation(rest, lineno)?;
            evs.push(Ev::Word(rest[..len].to_string()));
            rest = &rest[len..];
        } else {
            let mut end = rest.len();
            for (i, ch) in rest.char_indices() {
                if ch.is_whitespace()
                    || ch == '|'
                    || ch == '"'
                    || ch == '#'
                    || rest[i..].starts_with("::=")
                    || rest[i..].starts_with("rx%")
                {
                    end = i;
                    break;
                }
            }
            evs.push(Ev::Word(rest[..end].to_string()));
            rest = &rest[end..];
        }
    }
    Ok(evs)
}

/// Byte length of a leading `"..."` literal, escape-aware. None if unterminated.
fn scan_literal(s: &str) -> Option<usize> {
    let mut len = 1;
    let mut in_escape = false;
    for c in s[1..].chars() {
        len += c.len_utf8();
        if in_escape {
            in_escape = false;
            continue;
        }
        if c == '\\' {
            in_escape = true;
            continue;
        }
        if c == '"' {
            return if len > 2 { Some(len) } else { None };
        }
    }
    None
}

/// Byte length of a leading `rx%...%rx` term. None if unterminated.
fn scan_rx(s: &str) -> Option<usize> {
    s[3..].find("%rx").map(|end| end + 6)
}

/// Byte length of a leading `@word(...)` / `!word(...)` / `$word` / bare
/// sigil-word term. Argument lists may contain literals and regexes.
fn scan_annotation(s: &str, lineno: usize) -> Result<usize, GrammarError> {
    let mut len = 1; // the sigil
    for c in s[1..].chars() {
        if c.is_alphanumeric() || c == '_' {
            len += c.len_utf8();
        } else {
            break;
        }
    }
    if !s[len..].starts_with('(') {
        return Ok(len);
    }
    let mut depth = 0usize;
    let mut i = len;
    while i < s.len() {
        let rest = &s[i..];
        let c = rest.chars().next().unwrap();
        if c == '"' {
            i += scan_literal(rest).ok_or(GrammarError::UnterminatedLiteral { line: lineno })?;
        } else if rest.starts_with("rx%") {
            i += scan_rx(rest).ok_or(GrammarError::UnterminatedRegex { line: lineno })?;
        } else {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            i += c.len_utf8();
        }
    }
    Err(GrammarError::MalformedTerm {
        what: format!("annotation {}", &s[..len]),
        line: lineno,
    })
}
