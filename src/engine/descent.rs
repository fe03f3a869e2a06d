//! Predicated recursive descent.
//!
//! No memoization, no backtracking: alternations are selected by their
//! leading predicate (peek, guard, eof) or taken first-fit, and once an
//! alternation is committed to, a failed term is a parse error. Impure hooks
//! are therefore safe, which is what makes soft keywords and typedef-style
//! symbol tables workable.

use std::any::{Any, TypeId};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::AstNode;
use crate::error::ParseError;
use crate::grammar::{Grammar, Term, TokenRegex};
use crate::intern::Sym;
use crate::lexer::Token;

/// Result of a guard deciding whether an alternation is taken.
pub enum GuardResult {
    Accept,
    Reject,
    /// The guard has decided the parse is invalid at this position.
    HardError(String),
}

/// Predicate over the token stream; may read (not write) parser state.
pub type Guard = Rc<dyn Fn(&mut Session, &[Token], usize) -> GuardResult>;

/// User callback run mid-alternation. Receives the children built so far and
/// returns how many tokens it consumed. Allowed to be impure.
pub type Hook = Rc<dyn Fn(&mut Session, &[Token], usize, &mut Vec<AstNode>) -> Result<usize, String>>;

/// Type-keyed bag for user parse state (scope stacks, symbol tables).
#[derive(Default)]
pub struct AnyMap {
    map: FxHashMap<TypeId, Box<dyn Any>>,
}

impl AnyMap {
    pub fn insert<T: 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }
}

/// Guards and hooks registered for a parse.
#[derive(Default)]
pub struct Callbacks {
    pub guards: FxHashMap<String, Guard>,
    pub hooks: FxHashMap<String, Hook>,
}

/// Parser state exposed to guards and hooks.
pub struct Session<'g> {
    guards: FxHashMap<String, Guard>,
    hooks: FxHashMap<String, Hook>,
    /// User state. A hook named `init` typically seeds this.
    pub state: AnyMap,
    /// Keyed cache for regexes compiled inside guards; entries memoize
    /// per-symbol results. Use `entry(KEY).or_insert_with(...)` so the
    /// grammar and interner stay borrowable alongside it.
    pub regex_cache: FxHashMap<u64, TokenRegex>,
    pub grammar: &'g Grammar,
}

/// Parse `tokens` from `root`, requiring full consumption.
pub fn parse(
    g: &Grammar,
    root: &str,
    tokens: &[Token],
    callbacks: Callbacks,
    depth_limit: Option<usize>,
) -> Result<AstNode, ParseError> {
    let root_id = g
        .rule_id(root)
        .ok_or_else(|| ParseError::RuleNotFound { name: root.to_string() })?;
    let limit = depth_limit.unwrap_or(super::default_depth_limit());

    let mut session = Session {
        guards: callbacks.guards,
        hooks: callbacks.hooks,
        state: AnyMap::default(),
        regex_cache: FxHashMap::default(),
        grammar: g,
    };

    if let Some(init) = session.hooks.get("init").cloned() {
        let _ = init(&mut session, tokens, 0, &mut Vec::new());
    }

    let node = parse_rule(&mut session, root_id, tokens, 0, 0, limit)?;
    let consumed = node.real_token_count() as usize;
    if consumed != tokens.len() {
        return Err(ParseError::Incomplete {
            token_index: consumed,
            total: tokens.len(),
        });
    }
    Ok(node)
}

struct Frame<'g> {
    rule: &'g crate::grammar::Rule,
    /// Node name; `$become_as` replaces it mid-flight.
    node_sym: Sym,
    children: Vec<AstNode>,
    i: usize,
    start: usize,
    poisoned: bool,
    alt_id: usize,
}

fn parse_rule(
    session: &mut Session,
    rule_id: usize,
    tokens: &[Token],
    start: usize,
    depth: usize,
    limit: usize,
) -> Result<AstNode, ParseError> {
    let g = session.grammar;
    if depth > limit {
        return Err(ParseError::DepthLimit { limit });
    }

    let mut f = Frame {
        rule: &g.rules[rule_id],
        node_sym: g.rules[rule_id].sym,
        children: Vec::new(),
        i: start,
        start,
        poisoned: false,
        alt_id: 0,
    };

    log::trace!("entered {} at {} (depth {depth})", f.rule.name, f.i);

    // Explicit loop rather than an iterator: $become rewinds to alternation 0
    // of another rule in place.
    'top: while f.alt_id < f.rule.alts.len() {
        let alt = &f.rule.alts[f.alt_id];

        // An empty alternation is epsilon: always accepted.
        if alt.terms.is_empty() {
            return Ok(finish(f));
        }

        let mut term_idx = 0;
        match acceptance(session, tokens, &alt.terms[0], f.i)? {
            Some(false) => {
                f.alt_id += 1;
                continue;
            }
            Some(true) => term_idx = 1,
            None => {}
        }

        log::trace!("{}: chose alt {}", f.rule.name, f.alt_id);

        if f.children.capacity() == 0 {
            f.children.reserve_exact(alt.terms.len());
        }

        while term_idx < alt.terms.len() {
            match &alt.terms[term_idx] {
                Term::Rule(id) => {
                    let mut child = parse_rule(session, *id, tokens, f.i, depth + 1, limit);
                    recover(session.grammar, *id, tokens, &mut child, f.i);
                    let child = child?;
                    if child.is_poisoned() {
                        f.poisoned = true;
                    }
                    f.i += child.real_token_count() as usize;
                    f.children.push(child);
                }
                Term::Literal(sym) => {
                    if f.i < tokens.len() && tokens[f.i].sym == *sym {
                        if !alt.pruned {
                            f.children.push(AstNode::leaf(tokens[f.i].sym));
                        }
                        f.i += 1;
                    } else {
                        return Err(mismatch(session.grammar, &f, tokens));
                    }
                }
                Term::Regex(re) => {
                    if f.i < tokens.len()
                        && re.is_match_sym(tokens[f.i].sym, &session.grammar.interner)
                    {
                        if !alt.pruned {
                            f.children.push(AstNode::leaf(tokens[f.i].sym));
                        }
                        f.i += 1;
                    } else {
                        return Err(mismatch(session.grammar, &f, tokens));
                    }
                }
                Term::Any => {
                    if f.i < tokens.len() {
                        f.children.push(AstNode::leaf(tokens[f.i].sym));
                        f.i += 1;
                    } else {
                        return Err(mismatch(session.grammar, &f, tokens));
                    }
                }
                Term::Hook(name) => {
                    let hook = session.hooks.get(name).cloned().ok_or_else(|| {
                        ParseError::UnknownHook {
                            name: name.clone(),
                            rule: f.rule.name.clone(),
                        }
                    })?;
                    match hook(session, tokens, f.i, &mut f.children) {
                        Ok(consumed) => f.i += consumed,
                        Err(message) => {
                            return Err(ParseError::HookFailure {
                                name: name.clone(),
                                token_index: f.i,
                                message,
                            })
                        }
                    }
                }
                Term::Become { rule, rename } => {
                    f.rule = &g.rules[*rule];
                    f.alt_id = 0;
                    if *rename {
                        f.node_sym = f.rule.sym;
                    }
                    log::trace!("became {} at {}", f.rule.name, f.i);
                    continue 'top;
                }
                // Compile validation pins predicates to alternation heads.
                Term::Peek { .. } | Term::PeekRegex { .. } | Term::Guard(_) | Term::Eof => {
                    unreachable!("predicate past alternation head")
                }
            }
            term_idx += 1;
        }

        return Ok(finish(f));
    }

    Err(ParseError::NoAlternative {
        rule: f.rule.name.clone(),
        token_index: f.start,
    })
}

fn finish(f: Frame) -> AstNode {
    let mut count = (f.i - f.start) as u32;
    if f.poisoned {
        count ^= !0u32;
    }
    AstNode::new(Some(f.children), count, f.node_sym)
}

/// Evaluate a leading predicate. `None` means the term is not a predicate
/// (the alternation is committed to unconditionally).
fn acceptance(
    session: &mut Session,
    tokens: &[Token],
    term: &Term,
    i: usize,
) -> Result<Option<bool>, ParseError> {
    match term {
        Term::Guard(name) => {
            let guard = session
                .guards
                .get(name)
                .cloned()
                .ok_or_else(|| ParseError::UnknownGuard { name: name.clone() })?;
            match guard(session, tokens, i) {
                GuardResult::Accept => Ok(Some(true)),
                GuardResult::Reject => Ok(Some(false)),
                GuardResult::HardError(message) => Err(ParseError::GuardFailure {
                    name: name.clone(),
                    message,
                }),
            }
        }
        Term::Peek { offset, sym } => Ok(Some(match peek_index(i, *offset, tokens.len()) {
            Some(loc) => tokens[loc].sym == *sym,
            None => false,
        })),
        Term::PeekRegex { offset, re, reserved } => {
            let hit = match peek_index(i, *offset, tokens.len()) {
                Some(loc) => {
                    let sym = tokens[loc].sym;
                    let mut ok = re.is_match_sym(sym, &session.grammar.interner);
                    if ok && *reserved {
                        if let Some(r) = &session.grammar.reserved {
                            if r.is_match(session.grammar.interner.resolve(sym)) {
                                ok = false;
                            }
                        }
                    }
                    ok
                }
                None => false,
            };
            Ok(Some(hit))
        }
        Term::Eof => Ok(Some(i == tokens.len())),
        _ => Ok(None),
    }
}

fn peek_index(i: usize, offset: isize, len: usize) -> Option<usize> {
    let loc = i.checked_add_signed(offset)?;
    (loc < len).then_some(loc)
}

/// If a failed child rule declares a recovery set, seek forward for a sync
/// token and substitute an empty poisoned node spanning the skipped tokens.
fn recover(
    g: &Grammar,
    rule_id: usize,
    tokens: &[Token],
    child: &mut Result<AstNode, ParseError>,
    i: usize,
) {
    if child.is_ok() {
        return;
    }
    let Some(rec) = &g.rules[rule_id].recover else {
        return;
    };
    let mut j = i + 1;
    while j < tokens.len() && !rec.re.is_match(g.interner.resolve(tokens[j].sym)) {
        j += 1;
    }
    if j < tokens.len() {
        if rec.consume {
            j += 1;
        }
        log::debug!(
            "recovered {} by skipping tokens {}..{}",
            g.rules[rule_id].name,
            i,
            j
        );
        *child = Ok(AstNode::new(
            Some(Vec::new()),
            (j - i) as u32 ^ !0u32,
            g.rules[rule_id].sym,
        ));
    }
}

fn mismatch(g: &Grammar, f: &Frame, tokens: &[Token]) -> ParseError {
    let found = match tokens.get(f.i) {
        Some(t) => g.interner.resolve(t.sym).to_string(),
        None => "<no token>".to_string(),
    };
    ParseError::Mismatch {
        rule: f.rule.name.clone(),
        alt: f.alt_id,
        token_index: f.i,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{leaf_texts, shape_string};
    use crate::lexer::tokenize;

    fn parse_str(
        grammar: &str,
        input: &str,
        callbacks: Callbacks,
        depth_limit: Option<usize>,
    ) -> Result<(Grammar, AstNode), ParseError> {
        let mut g = Grammar::from_str(grammar).unwrap();
        let tokens = tokenize(&mut g, input).unwrap();
        let root = g.root_rule().to_string();
        let node = parse(&g, &root, &tokens, callbacks, depth_limit)?;
        Ok((g, node))
    }

    const LISP: &str = r#"
S ::= @peek(0, "(") parenexpr
parenexpr ::=
    @peek(1, ")") "(" ")" $pruned
    | "(" $become itemlist $pruned
itemlist ::=
    @peek(0, ")") $pruned ")"
    | @peek(0, "(") parenexpr $become itemlist
    | @auto rx%[a-zA-Z_][a-zA-Z_0-9]*|[0-9.]+%rx $become itemlist
"#;

    #[test]
    fn parses_nested_lists() {
        let (g, ast) = parse_str(
            LISP,
            "(a b (q x)kfwaiei i  9 (af0f1a) () () )",
            Callbacks::default(),
            None,
        )
        .unwrap();
        assert!(!ast.is_poisoned());
        let leaves = leaf_texts(&ast, &g.interner);
        assert!(leaves.contains(&"kfwaiei".to_string()));
        // $pruned drops the brackets from pruned alternations
        assert!(!leaves.contains(&"(".to_string()));
    }

    #[test]
    fn become_builds_long_lists_without_deep_recursion() {
        let input = format!("({})", "a ".repeat(50_000));
        let (_, ast) = parse_str(LISP, &input, Callbacks::default(), Some(16)).unwrap();
        assert_eq!(ast.real_token_count(), 50_002);
    }

    #[test]
    fn committed_alternation_fails_hard() {
        let err = parse_str(
            r#"S ::= @peek(0, "a") "a" "b""#,
            "a a",
            Callbacks::default(),
            None,
        )
        .unwrap_err();
        match err {
            ParseError::Mismatch { rule, token_index, found, .. } => {
                assert_eq!(rule, "S");
                assert_eq!(token_index, 1);
                assert_eq!(found, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_matching_alternative_reports_the_rule() {
        let err = parse_str(
            r#"
S ::= item
item ::= @peek(0, "x") "x" | @peek(0, "y") "y"
junk ::= rx%[a-z]+%rx
"#,
            "z",
            Callbacks::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::NoAlternative { rule, .. } if rule == "item"));
    }

    #[test]
    fn guards_select_alternations() {
        let mut callbacks = Callbacks::default();
        callbacks.guards.insert(
            "odd".to_string(),
            Rc::new(|session: &mut Session, tokens: &[Token], i: usize| {
                if i < tokens.len() {
                    if let Ok(n) = session.grammar.interner.resolve(tokens[i].sym).parse::<i64>() {
                        if n & 1 == 1 {
                            return GuardResult::Accept;
                        }
                    }
                }
                GuardResult::Reject
            }),
        );
        let grammar = r#"
S ::= item
item ::= @guard(odd) odd | even
odd ::= rx%[0-9]+%rx
even ::= rx%[0-9]+%rx
"#;
        let (g, ast) = parse_str(grammar, "3", Callbacks { guards: callbacks.guards.clone(), ..Default::default() }, None).unwrap();
        let item = &ast.children.as_ref().unwrap()[0];
        let chosen = &item.children.as_ref().unwrap()[0];
        assert_eq!(g.interner.resolve(chosen.sym), "odd");

        let (g, ast) = parse_str(grammar, "4", Callbacks { guards: callbacks.guards, ..Default::default() }, None).unwrap();
        let item = &ast.children.as_ref().unwrap()[0];
        let chosen = &item.children.as_ref().unwrap()[0];
        assert_eq!(g.interner.resolve(chosen.sym), "even");
    }

    #[test]
    fn unknown_guard_is_an_error() {
        let err = parse_str(
            "S ::= @guard(nope) rx%[a-z]+%rx",
            "x",
            Callbacks::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::UnknownGuard { name } if name == "nope"));
    }

    #[test]
    fn hooks_track_typedef_style_state() {
        // A miniature of the C typedef problem: `use` only parses when its
        // head token was declared by an earlier `typedef` statement.
        #[derive(Default)]
        struct Declared(Vec<String>);

        let mut callbacks = Callbacks::default();
        callbacks.hooks.insert(
            "init".to_string(),
            Rc::new(|session: &mut Session, _: &[Token], _: usize, _: &mut Vec<AstNode>| {
                session.state.insert(Declared::default());
                Ok(0)
            }),
        );
        callbacks.hooks.insert(
            "log_typedef".to_string(),
            Rc::new(
                |session: &mut Session, _: &[Token], _: usize, children: &mut Vec<AstNode>| {
                    // children are ["typedef", name, ";"]
                    let name = session.grammar.interner.resolve(children[1].sym).to_string();
                    match session.state.get_mut::<Declared>() {
                        Some(d) => d.0.push(name),
                        None => return Err("state not initialized".to_string()),
                    }
                    Ok(0)
                },
            ),
        );
        callbacks.guards.insert(
            "is_typedef".to_string(),
            Rc::new(|session: &mut Session, tokens: &[Token], i: usize| {
                if i < tokens.len() {
                    let text = session.grammar.interner.resolve(tokens[i].sym);
                    if let Some(d) = session.state.get::<Declared>() {
                        if d.0.iter().any(|n| n == text) {
                            return GuardResult::Accept;
                        }
                    }
                }
                GuardResult::Reject
            }),
        );

        let grammar = r#"
S ::= decl use
decl ::= @peek(0, "typedef") "typedef" rx%[a-z]+%rx ";" !hook(log_typedef)
use ::= @guard(is_typedef) rx%[a-z]+%rx rx%[a-z]+%rx ";"
"#;
        let ok = parse_str(grammar, "typedef foo ; foo x ;", take(&mut callbacks), None);
        assert!(ok.is_ok());

        // rebuild callbacks for the failing case
        let err = parse_str(grammar, "typedef foo ; bar x ;", rebuild(), None).unwrap_err();
        assert!(matches!(err, ParseError::NoAlternative { rule, .. } if rule == "use"));

        fn take(c: &mut Callbacks) -> Callbacks {
            std::mem::take(c)
        }
        fn rebuild() -> Callbacks {
            // Closures above are move-free; simplest is to rebuild inline.
            let mut c = Callbacks::default();
            c.hooks.insert(
                "init".to_string(),
                Rc::new(|session: &mut Session, _: &[Token], _: usize, _: &mut Vec<AstNode>| {
                    session.state.insert(Declared::default());
                    Ok(0)
                }),
            );
            c.hooks.insert(
                "log_typedef".to_string(),
                Rc::new(
                    |session: &mut Session, _: &[Token], _: usize, children: &mut Vec<AstNode>| {
                        let name =
                            session.grammar.interner.resolve(children[1].sym).to_string();
                        match session.state.get_mut::<Declared>() {
                            Some(d) => d.0.push(name),
                            None => return Err("state not initialized".to_string()),
                        }
                        Ok(0)
                    },
                ),
            );
            c.guards.insert(
                "is_typedef".to_string(),
                Rc::new(|session: &mut Session, tokens: &[Token], i: usize| {
                    if i < tokens.len() {
                        let text = session.grammar.interner.resolve(tokens[i].sym);
                        if let Some(d) = session.state.get::<Declared>() {
                            if d.0.iter().any(|n| n == text) {
                                return GuardResult::Accept;
                            }
                        }
                    }
                    GuardResult::Reject
                }),
            );
            c
        }
    }

    #[test]
    fn recovery_poisons_the_tree() {
        let grammar = r#"
S ::= stmt stmt
stmt ::= @peekr(0, rx%[a-z]+%rx) rx%[a-z]+%rx ";"
    | @recover ";"
junk ::= rx%[0-9]+%rx
"#;
        let (_, ast) = parse_str(grammar, "foo ; 123 ;", Callbacks::default(), None).unwrap();
        assert!(ast.is_poisoned());
        assert_eq!(ast.real_token_count(), 4);
        assert!(shape_string(&ast).contains('p'));
    }

    #[test]
    fn depth_limit_is_an_error_not_a_crash() {
        let grammar = r#"S ::= @peek(0, "(") "(" S ")" | "x""#;
        let input = format!("{}x{}", "( ".repeat(100), " )".repeat(100));
        let err = parse_str(grammar, &input, Callbacks::default(), Some(64)).unwrap_err();
        assert!(matches!(err, ParseError::DepthLimit { limit: 64 }));

        let ok = parse_str(grammar, &input, Callbacks::default(), Some(256));
        assert!(ok.is_ok());
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse_str("S ::= \"a\"", "a a", Callbacks::default(), None).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Incomplete { token_index: 1, total: 2 }
        ));
    }

    #[test]
    fn eof_predicate_ends_lists() {
        let grammar = r#"
list ::= @eof | item $become list
item ::= rx%[a-z]+%rx
"#;
        let (g, ast) = parse_str(grammar, "x y z", Callbacks::default(), None).unwrap();
        assert_eq!(ast.real_token_count(), 3);
        assert_eq!(leaf_texts(&ast, &g.interner).len(), 3);
    }

    #[test]
    fn reserved_words_block_auto_regexes() {
        let grammar = r#"
__RESERVED_WORDS ::= end
list ::= @eof | @auto rx%[a-z]+%rx $become list
"#;
        let (_, ast) = parse_str(grammar, "a b", Callbacks::default(), None).unwrap();
        assert_eq!(ast.real_token_count(), 2);

        // "end" matches [a-z]+ but is reserved, so the auto alternation
        // refuses it and no alternation remains
        let err = parse_str(grammar, "a end", Callbacks::default(), None).unwrap_err();
        assert!(matches!(err, ParseError::NoAlternative { rule, .. } if rule == "list"));
    }
}
