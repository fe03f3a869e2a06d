//! Grammar model: compiled rules, terminals, annotations, and the
//! tokenizer-facing tables (literals, regexes, comments, bracket pairs).

pub mod parser;

use std::cell::RefCell;
use std::path::Path;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::GrammarError;
use crate::intern::{Interner, Sym};
use parser::RawRule;

/// Full-token regex with a per-symbol match cache. Token texts are interned,
/// so each distinct text is tested at most once.
#[derive(Debug)]
pub struct TokenRegex {
    pub pattern: String,
    re: Regex,
    cache: RefCell<FxHashMap<Sym, bool>>,
}

impl TokenRegex {
    /// `pattern` is anchored on both ends: terminals match whole tokens.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!(r"\A(?:{pattern})\z"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            re,
            cache: RefCell::new(FxHashMap::default()),
        })
    }

    pub fn is_match_sym(&self, sym: Sym, interner: &Interner) -> bool {
        if let Some(hit) = self.cache.borrow().get(&sym) {
            return *hit;
        }
        let result = self.re.is_match(interner.resolve(sym));
        self.cache.borrow_mut().insert(sym, result);
        result
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.re.is_match(text)
    }
}

#[derive(Debug)]
pub enum Term {
    /// Call of another rule, by dense id.
    Rule(usize),
    /// Match one token by interned text.
    Literal(Sym),
    /// Match one token by full-token regex.
    Regex(TokenRegex),
    /// Predicate: token at relative offset equals the interned text.
    Peek { offset: isize, sym: Sym },
    /// Predicate: token at relative offset matches the regex. `reserved`
    /// additionally rejects `__RESERVED_WORDS` (the `@auto` path).
    PeekRegex {
        offset: isize,
        re: TokenRegex,
        reserved: bool,
    },
    /// Predicate: user guard, looked up by name at parse time.
    Guard(String),
    /// Predicate: cursor is at end of input.
    Eof,
    /// User hook; may consume tokens and rewrite pending children.
    Hook(String),
    /// Match any single token.
    Any,
    /// Tail call into `rule`; `rename` replaces the node name ($become_as).
    Become { rule: usize, rename: bool },
}

impl Term {
    fn is_predicate(&self) -> bool {
        matches!(
            self,
            Term::Peek { .. } | Term::PeekRegex { .. } | Term::Guard(_) | Term::Eof
        )
    }

    fn is_annotation(&self) -> bool {
        !matches!(self, Term::Rule(_) | Term::Literal(_) | Term::Regex(_))
    }
}

#[derive(Debug, Default)]
pub struct Alternation {
    pub terms: Vec<Term>,
    /// `$pruned`: bare terminals in this alternation produce no leaf nodes.
    pub pruned: bool,
}

/// Error-recovery sync set for a rule (`@recover` / `@recover_before`).
#[derive(Debug)]
pub struct Recovery {
    pub re: Regex,
    /// Consume the sync token (`@recover`) or stop before it (`_before`).
    pub consume: bool,
}

#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub sym: Sym,
    pub id: usize,
    pub alts: Vec<Alternation>,
    pub recover: Option<Recovery>,
}

#[derive(Debug, Clone)]
pub struct BlockComment {
    pub open: String,
    pub close: String,
    pub nested: bool,
}

#[derive(Debug, Default)]
pub struct Grammar {
    pub rules: Vec<Rule>,
    pub by_name: FxHashMap<String, usize>,
    pub interner: Interner,

    /// Literal token texts, registered with the tokenizer.
    pub literals: Vec<String>,
    /// Prefix-anchored forms of the grammar regexes, for maximal munch.
    pub lexer_regexes: Vec<Regex>,

    pub line_comments: Vec<String>,
    pub block_comments: Vec<BlockComment>,
    pub bracket_pairs: Vec<(Sym, Sym)>,
    pub reserved: Option<Regex>,

    annotated: bool,
}

impl Grammar {
    pub fn from_str(source: &str) -> Result<Self, GrammarError> {
        compile(parser::parse_bnf(source)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, GrammarError> {
        let content = std::fs::read_to_string(path).map_err(|e| GrammarError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content)
    }

    /// Default root: the first rule defined.
    pub fn root_rule(&self) -> &str {
        &self.rules[0].name
    }

    pub fn rule_id(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// True if the grammar uses descent-only features (predicates, guards,
    /// hooks, directives, recovery, reserved words).
    pub fn is_annotated(&self) -> bool {
        self.annotated
    }

    /// Rule names unreachable from `root` (for `check` diagnostics).
    pub fn unreachable_rules(&self, root: usize) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut work = vec![root];
        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            for alt in &self.rules[id].alts {
                for term in &alt.terms {
                    match term {
                        Term::Rule(r) | Term::Become { rule: r, .. } => work.push(*r),
                        _ => {}
                    }
                }
            }
        }
        self.rules
            .iter()
            .filter(|r| !seen.contains(&r.id))
            .map(|r| r.name.clone())
            .collect()
    }
}

const PSEUDO_RULES: &[&str] = &[
    "__COMMENTS",
    "__COMMENT_PAIRS",
    "__COMMENT_PAIRS_NESTED",
    "__BRACKET_PAIRS",
    "__RESERVED_WORDS",
];

fn compile(raw: Vec<RawRule>) -> Result<Grammar, GrammarError> {
    let mut g = Grammar::default();

    let real: Vec<&RawRule> = raw
        .iter()
        .filter(|r| !PSEUDO_RULES.contains(&r.name.as_str()))
        .collect();
    if real.is_empty() {
        return Err(GrammarError::Empty);
    }

    for pseudo in raw.iter().filter(|r| PSEUDO_RULES.contains(&r.name.as_str())) {
        apply_pseudo_rule(&mut g, pseudo)?;
    }

    for (id, rule) in real.iter().enumerate() {
        if g.by_name.insert(rule.name.clone(), id).is_some() {
            return Err(GrammarError::DuplicateRule {
                name: rule.name.clone(),
            });
        }
    }

    for (id, rule) in real.iter().enumerate() {
        let compiled = compile_rule(&mut g, rule, id)?;
        g.rules.push(compiled);
    }

    g.literals.sort();
    g.literals.dedup();

    g.annotated = g.annotated
        || g.reserved.is_some()
        || g.rules.iter().any(|r| {
            r.recover.is_some()
                || r.alts
                    .iter()
                    .any(|a| a.pruned || a.terms.iter().any(Term::is_annotation))
        });

    Ok(g)
}

fn compile_rule(g: &mut Grammar, raw: &RawRule, id: usize) -> Result<Rule, GrammarError> {
    let line = raw.line;
    let mut alts = Vec::new();
    let mut recover = None;

    for raw_alt in &raw.alts {
        // `@recover ...` alternations configure the rule instead of matching.
        if matches!(raw_alt.first().map(String::as_str), Some("@recover") | Some("@recover_before")) {
            recover = Some(compile_recovery(raw_alt, line)?);
            continue;
        }

        let mut alt = Alternation::default();
        let mut i = 0;
        while i < raw_alt.len() {
            let word = &raw_alt[i];
            match classify(g, word, line)? {
                Classified::Term(t) => {
                    if t.is_predicate() && !alt.terms.is_empty() {
                        return Err(GrammarError::MalformedTerm {
                            what: format!("predicate {word} (must start its alternation)"),
                            line,
                        });
                    }
                    alt.terms.push(t);
                }
                Classified::Pruned => alt.pruned = true,
                Classified::Auto => {
                    let target = raw_alt.get(i + 1).ok_or(GrammarError::MalformedTerm {
                        what: "@auto (needs a following terminal)".into(),
                        line,
                    })?;
                    if !alt.terms.is_empty() {
                        return Err(GrammarError::MalformedTerm {
                            what: "@auto (must start its alternation)".into(),
                            line,
                        });
                    }
                    for t in desugar_auto(g, target, line)? {
                        alt.terms.push(t);
                    }
                    i += 1;
                }
                Classified::Become { rename } => {
                    let target = raw_alt.get(i + 1).ok_or(GrammarError::MisplacedBecome {
                        rule: raw.name.clone(),
                        line,
                    })?;
                    // Only a single trailing $pruned may follow the target.
                    let tail_ok = i + 2 == raw_alt.len()
                        || (i + 3 == raw_alt.len() && raw_alt[i + 2] == "$pruned");
                    if !tail_ok {
                        return Err(GrammarError::MisplacedBecome {
                            rule: raw.name.clone(),
                            line,
                        });
                    }
                    let rule = *g
                        .by_name
                        .get(target.as_str())
                        .ok_or_else(|| GrammarError::UndefinedRule {
                            name: target.clone(),
                            line,
                        })?;
                    alt.terms.push(Term::Become { rule, rename });
                    i += 1;
                }
            }
            i += 1;
        }
        alts.push(alt);
    }

    Ok(Rule {
        name: raw.name.clone(),
        sym: g.interner.intern(&raw.name),
        id,
        alts,
        recover,
    })
}

enum Classified {
    Term(Term),
    Pruned,
    Auto,
    Become { rename: bool },
}

fn classify(g: &mut Grammar, word: &str, line: usize) -> Result<Classified, GrammarError> {
    if word.starts_with('"') {
        let text = unescape_literal(word);
        g.literals.push(text.clone());
        return Ok(Classified::Term(Term::Literal(g.interner.intern(&text))));
    }
    if word.starts_with("rx%") {
        let pattern = &word[3..word.len() - 3];
        let re = token_regex(pattern, line)?;
        g.lexer_regexes.push(prefix_regex(pattern, line)?);
        return Ok(Classified::Term(Term::Regex(re)));
    }
    if let Some(args) = annotation_args(word, "@peek") {
        let (offset, arg) = split_peek_args(&args, line)?;
        if !arg.starts_with('"') {
            return Err(GrammarError::MalformedTerm {
                what: format!("@peek argument {arg}"),
                line,
            });
        }
        let text = unescape_literal(&arg);
        g.literals.push(text.clone());
        return Ok(Classified::Term(Term::Peek {
            offset,
            sym: g.interner.intern(&text),
        }));
    }
    if let Some(args) = annotation_args(word, "@peekr") {
        let (offset, arg) = split_peek_args(&args, line)?;
        if !arg.starts_with("rx%") {
            return Err(GrammarError::MalformedTerm {
                what: format!("@peekr argument {arg}"),
                line,
            });
        }
        let re = token_regex(&arg[3..arg.len() - 3], line)?;
        return Ok(Classified::Term(Term::PeekRegex {
            offset,
            re,
            reserved: false,
        }));
    }
    if let Some(name) = annotation_args(word, "@guard") {
        return Ok(Classified::Term(Term::Guard(name.trim().to_string())));
    }
    if let Some(name) = annotation_args(word, "!hook") {
        return Ok(Classified::Term(Term::Hook(name.trim().to_string())));
    }
    match word {
        "@eof" => return Ok(Classified::Term(Term::Eof)),
        "@auto" => return Ok(Classified::Auto),
        "$any" => return Ok(Classified::Term(Term::Any)),
        "$pruned" => return Ok(Classified::Pruned),
        "$become" => return Ok(Classified::Become { rename: false }),
        "$become_as" => return Ok(Classified::Become { rename: true }),
        _ => {}
    }
    if word.starts_with('@') || word.starts_with('!') || word.starts_with('$') {
        return Err(GrammarError::MalformedTerm {
            what: format!("annotation {word}"),
            line,
        });
    }
    let id = *g
        .by_name
        .get(word)
        .ok_or_else(|| GrammarError::UndefinedRule {
            name: word.to_string(),
            line,
        })?;
    Ok(Classified::Term(Term::Rule(id)))
}

/// `@auto t` is `@peek(0, t) t` for literals, `@peekr(0, t) t` (honoring
/// reserved words) for regexes.
fn desugar_auto(g: &mut Grammar, target: &str, line: usize) -> Result<Vec<Term>, GrammarError> {
    if target.starts_with('"') {
        let text = unescape_literal(target);
        g.literals.push(text.clone());
        let sym = g.interner.intern(&text);
        return Ok(vec![Term::Peek { offset: 0, sym }, Term::Literal(sym)]);
    }
    if target.starts_with("rx%") {
        let pattern = &target[3..target.len() - 3];
        g.lexer_regexes.push(prefix_regex(pattern, line)?);
        return Ok(vec![
            Term::PeekRegex {
                offset: 0,
                re: token_regex(pattern, line)?,
                reserved: true,
            },
            Term::Regex(token_regex(pattern, line)?),
        ]);
    }
    Err(GrammarError::MalformedTerm {
        what: format!("@auto target {target} (must be a terminal)"),
        line,
    })
}

fn compile_recovery(raw_alt: &[String], line: usize) -> Result<Recovery, GrammarError> {
    let consume = raw_alt[0] == "@recover";
    let mut parts = Vec::new();
    for word in &raw_alt[1..] {
        if word.starts_with('"') {
            parts.push(regex::escape(&unescape_literal(word)));
        } else if word.starts_with("rx%") {
            parts.push(format!("(?:{})", &word[3..word.len() - 3]));
        } else {
            return Err(GrammarError::MalformedTerm {
                what: format!("recovery term {word} (must be a terminal)"),
                line,
            });
        }
    }
    if parts.is_empty() {
        return Err(GrammarError::MalformedTerm {
            what: "@recover (needs at least one sync terminal)".into(),
            line,
        });
    }
    let pattern = format!(r"\A(?:{})\z", parts.join("|"));
    let re = Regex::new(&pattern).map_err(|e| GrammarError::InvalidRegex {
        pattern,
        line,
        source: e,
    })?;
    Ok(Recovery { re, consume })
}

fn apply_pseudo_rule(g: &mut Grammar, raw: &RawRule) -> Result<(), GrammarError> {
    let line = raw.line;
    let expect = |cond: bool, expected: &str| -> Result<(), GrammarError> {
        if cond {
            Ok(())
        } else {
            Err(GrammarError::BadPseudoRule {
                name: raw.name.clone(),
                expected: expected.to_string(),
                line,
            })
        }
    };

    match raw.name.as_str() {
        "__COMMENTS" => {
            for alt in &raw.alts {
                expect(alt.len() == 1 && alt[0].starts_with('"'), "one literal per alternation")?;
                g.line_comments.push(unescape_literal(&alt[0]));
            }
        }
        "__COMMENT_PAIRS" | "__COMMENT_PAIRS_NESTED" => {
            let nested = raw.name.ends_with("NESTED");
            for alt in &raw.alts {
                expect(
                    alt.len() == 2 && alt.iter().all(|w| w.starts_with('"')),
                    "two literals per alternation",
                )?;
                g.block_comments.push(BlockComment {
                    open: unescape_literal(&alt[0]),
                    close: unescape_literal(&alt[1]),
                    nested,
                });
            }
        }
        "__BRACKET_PAIRS" => {
            for alt in &raw.alts {
                expect(
                    alt.len() == 2 && alt.iter().all(|w| w.starts_with('"')),
                    "two literals per alternation",
                )?;
                let open = unescape_literal(&alt[0]);
                let close = unescape_literal(&alt[1]);
                g.literals.push(open.clone());
                g.literals.push(close.clone());
                let pair = (g.interner.intern(&open), g.interner.intern(&close));
                g.bracket_pairs.push(pair);
            }
        }
        "__RESERVED_WORDS" => {
            let mut words = Vec::new();
            for alt in &raw.alts {
                for w in alt {
                    let text = if w.starts_with('"') {
                        unescape_literal(w)
                    } else {
                        w.clone()
                    };
                    expect(!text.is_empty(), "bare words or literals")?;
                    words.push(regex::escape(&text));
                }
            }
            expect(!words.is_empty(), "at least one word")?;
            let pattern = format!(r"\A(?:{})\z", words.join("|"));
            g.reserved = Some(Regex::new(&pattern).map_err(|e| GrammarError::InvalidRegex {
                pattern,
                line,
                source: e,
            })?);
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn unescape_literal(word: &str) -> String {
    let inner = &word[1..word.len() - 1];
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

fn token_regex(pattern: &str, line: usize) -> Result<TokenRegex, GrammarError> {
    TokenRegex::new(pattern).map_err(|e| GrammarError::InvalidRegex {
        pattern: pattern.to_string(),
        line,
        source: e,
    })
}

fn prefix_regex(pattern: &str, line: usize) -> Result<Regex, GrammarError> {
    let anchored = format!(r"\A(?:{pattern})");
    Regex::new(&anchored).map_err(|e| GrammarError::InvalidRegex {
        pattern: anchored,
        line,
        source: e,
    })
}

fn annotation_args(word: &str, head: &str) -> Option<String> {
    let rest = word.strip_prefix(head)?;
    let rest = rest.strip_prefix('(')?;
    let rest = rest.strip_suffix(')')?;
    Some(rest.to_string())
}

/// Split `N, <terminal>` peek arguments.
fn split_peek_args(args: &str, line: usize) -> Result<(isize, String), GrammarError> {
    let (n, rest) = args.split_once(',').ok_or(GrammarError::MalformedTerm {
        what: format!("peek arguments {args}"),
        line,
    })?;
    let offset = n.trim().parse::<isize>().map_err(|_| GrammarError::MalformedTerm {
        what: format!("peek offset {n}"),
        line,
    })?;
    Ok((offset, rest.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISP: &str = r#"
S ::= @peek(0, "(") parenexpr
parenexpr ::=
    @peek(1, ")") "(" ")" $pruned
    | "(" $become itemlist $pruned
itemlist ::=
    @peek(0, ")") $pruned ")"
    | @peek(0, "(") parenexpr $become itemlist
    | @auto rx%[a-zA-Z_][a-zA-Z_0-9]*|[0-9.]*%rx $become itemlist
"#;

    #[test]
    fn compiles_annotated_grammar() {
        let g = Grammar::from_str(LISP).unwrap();
        assert_eq!(g.rules.len(), 3);
        assert_eq!(g.root_rule(), "S");
        assert!(g.is_annotated());
        assert!(g.literals.contains(&"(".to_string()));
        assert!(g.literals.contains(&")".to_string()));
        assert_eq!(g.lexer_regexes.len(), 1);

        let parenexpr = &g.rules[g.rule_id("parenexpr").unwrap()];
        assert!(parenexpr.alts[0].pruned);
        assert!(matches!(parenexpr.alts[0].terms[0], Term::Peek { offset: 1, .. }));
        let itemlist_id = g.rule_id("itemlist").unwrap();
        assert!(matches!(
            parenexpr.alts[1].terms.last(),
            Some(Term::Become { rule, rename: false }) if *rule == itemlist_id
        ));
    }

    #[test]
    fn pure_bnf_is_not_annotated() {
        let g = Grammar::from_str("S ::= \"a\" S | \"a\"").unwrap();
        assert!(!g.is_annotated());
        assert_eq!(g.rules[0].alts.len(), 2);
    }

    #[test]
    fn undefined_rule_reference_fails() {
        let err = Grammar::from_str("S ::= missing").unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedRule { name, .. } if name == "missing"));
    }

    #[test]
    fn duplicate_rule_fails() {
        let err = Grammar::from_str("S ::= \"a\"\nS ::= \"b\"").unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule { .. }));
    }

    #[test]
    fn invalid_regex_fails() {
        let err = Grammar::from_str("S ::= rx%[%rx").unwrap_err();
        assert!(matches!(err, GrammarError::InvalidRegex { .. }));
    }

    #[test]
    fn pseudo_rules_configure_the_tokenizer() {
        let src = r##"
__COMMENTS ::= "//" | "#"
__COMMENT_PAIRS ::= "/*" "*/"
__BRACKET_PAIRS ::= "(" ")"
__RESERVED_WORDS ::= if else
S ::= "(" rx%[a-z]+%rx ")"
"##;
        let g = Grammar::from_str(src).unwrap();
        assert_eq!(g.line_comments, vec!["//", "#"]);
        assert_eq!(g.block_comments.len(), 1);
        assert!(!g.block_comments[0].nested);
        assert_eq!(g.bracket_pairs.len(), 1);
        let reserved = g.reserved.as_ref().unwrap();
        assert!(reserved.is_match("if"));
        assert!(!reserved.is_match("iffy"));
    }

    #[test]
    fn recovery_alternation_is_extracted() {
        let src = r#"
S ::= stmt
stmt ::= rx%[a-z]+%rx ";" | @recover ";"
"#;
        let g = Grammar::from_str(src).unwrap();
        let stmt = &g.rules[g.rule_id("stmt").unwrap()];
        assert_eq!(stmt.alts.len(), 1);
        let rec = stmt.recover.as_ref().unwrap();
        assert!(rec.consume);
        assert!(rec.re.is_match(";"));
        assert!(!rec.re.is_match("x"));
    }

    #[test]
    fn become_must_end_its_alternation() {
        let src = "T ::= \"t\"\nS ::= \"a\" $become T \"y\"";
        let err = Grammar::from_str(src).unwrap_err();
        assert!(matches!(err, GrammarError::MisplacedBecome { rule, .. } if rule == "S"));

        // a trailing $pruned is the one allowed suffix; terms after it are not
        let src = "T ::= \"t\"\nS ::= \"a\" $become T $pruned \"y\"";
        let err = Grammar::from_str(src).unwrap_err();
        assert!(matches!(err, GrammarError::MisplacedBecome { rule, .. } if rule == "S"));

        let src = "T ::= \"t\"\nS ::= \"a\" $become T $pruned";
        assert!(Grammar::from_str(src).is_ok());
    }

    #[test]
    fn predicate_must_lead_its_alternation() {
        let err = Grammar::from_str("S ::= \"a\" @peek(0, \"b\")").unwrap_err();
        assert!(matches!(err, GrammarError::MalformedTerm { .. }));
    }

    #[test]
    fn unreachable_rules_are_reported() {
        let g = Grammar::from_str("S ::= \"a\"\norphan ::= \"b\"").unwrap();
        assert_eq!(g.unreachable_rules(0), vec!["orphan".to_string()]);
    }

    #[test]
    fn token_regex_caches_by_symbol() {
        let mut interner = Interner::default();
        let a = interner.intern("abc");
        let n = interner.intern("123");
        let re = TokenRegex::new("[a-z]+").unwrap();
        assert!(re.is_match_sym(a, &interner));
        assert!(!re.is_match_sym(n, &interner));
        // cached result, same answer
        assert!(re.is_match_sym(a, &interner));
    }
}
