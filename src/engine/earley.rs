//! Earley recognizer. Handles ambiguity and left recursion on pure BNF
//! grammars; answers "does the input belong to the language" without
//! building a tree.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ParseError;
use crate::grammar::{Grammar, Term};
use crate::lexer::Token;

/// Insertion-ordered set with O(1) membership, indexable by insertion order.
#[derive(Debug, Default)]
pub struct VecSet<T> {
    v: Vec<T>,
    s: FxHashMap<T, usize>,
}

impl<T: Clone + Eq + std::hash::Hash> VecSet<T> {
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(i) = self.s.get(&item) {
            return *i;
        }
        self.v.push(item.clone());
        self.s.insert(item, self.v.len() - 1);
        self.v.len() - 1
    }

    pub fn contains(&self, item: &T) -> bool {
        self.s.contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }
}

impl<T> std::ops::Index<usize> for VecSet<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        self.v.index(i)
    }
}

// Field sizes keep StateItem at 16 bytes, a quarter of a cache line.
#[derive(Clone, Default, Debug, Hash, PartialEq, Eq)]
pub struct StateItem {
    /// Column holding the corresponding zero-dot item.
    pub start: usize,
    pub rule: u32,
    pub alt: u16,
    /// Earley dot position.
    pub pos: u16,
}

pub fn chart_fill(g: &Grammar, root_id: usize, tokens: &[Token]) -> Vec<VecSet<StateItem>> {
    let mut chart = vec![VecSet::default()];

    for i in 0..g.rules[root_id].alts.len() {
        chart[0].insert(StateItem {
            start: 0,
            rule: root_id as u32,
            alt: i as u16,
            pos: 0,
        });
    }

    // (start col, rule) -> parent rows, to avoid a linear scan for parents
    // to advance when a child completes.
    let mut origin_sets: FxHashMap<(usize, usize), FxHashSet<usize>> = FxHashMap::default();

    let mut col = 0;
    let mut row = 0;
    while col < chart.len() {
        if row >= chart[col].len() {
            col += 1;
            row = 0;
            continue;
        }
        let item = chart[col][row].clone();
        let terms = &g.rules[item.rule as usize].alts[item.alt as usize].terms;
        if item.pos as usize >= terms.len() {
            // Completion
            if let Some(set) = origin_sets.get(&(item.start, item.rule as usize)) {
                let parents: Vec<usize> = set.iter().copied().collect();
                for parent_row in parents {
                    let mut new_parent = chart[item.start][parent_row].clone();
                    new_parent.pos += 1;
                    chart[col].insert(new_parent);
                }
            }
        } else {
            match &terms[item.pos as usize] {
                // Prediction. Runs in the final column too, so nullable
                // rules at the end of input still complete.
                Term::Rule(id) => {
                    let origin = origin_sets.entry((col, *id)).or_default();
                    origin.insert(row);
                    for i in 0..g.rules[*id].alts.len() {
                        chart[col].insert(StateItem {
                            start: col,
                            rule: *id as u32,
                            alt: i as u16,
                            pos: 0,
                        });
                    }
                    // If the predicted rule already derived empty in this
                    // column, its completion ran before this parent was in
                    // the origin set; advance the parent now.
                    let nulled = g.rules[*id].alts.iter().enumerate().any(|(a, alt)| {
                        chart[col].contains(&StateItem {
                            start: col,
                            rule: *id as u32,
                            alt: a as u16,
                            pos: alt.terms.len() as u16,
                        })
                    });
                    if nulled {
                        let mut advanced = item.clone();
                        advanced.pos += 1;
                        chart[col].insert(advanced);
                    }
                }
                // Scan
                term if col < tokens.len() => {
                    let matched = match term {
                        Term::Literal(sym) => tokens[col].sym == *sym,
                        Term::Regex(re) => re.is_match_sym(tokens[col].sym, &g.interner),
                        _ => false,
                    };
                    if matched {
                        let mut new_item = item.clone();
                        new_item.pos += 1;
                        if col + 1 >= chart.len() {
                            chart.push(VecSet::default());
                        }
                        chart[col + 1].insert(new_item);
                    }
                }
                _ => {}
            }
        }
        row += 1;
    }

    chart
}

/// Recognize `tokens` against `root`. The error carries how many chart
/// columns were filled before the recognizer starved, which is also the
/// index of the first token no partial parse could reach.
pub fn recognize(g: &Grammar, root: &str, tokens: &[Token]) -> Result<(), ParseError> {
    let root_id = g
        .rule_id(root)
        .ok_or_else(|| ParseError::RuleNotFound { name: root.to_string() })?;
    let chart = chart_fill(g, root_id, tokens);

    if chart.len() == tokens.len() + 1 {
        for (i, alt) in g.rules[root_id].alts.iter().enumerate() {
            let expected = StateItem {
                start: 0,
                rule: root_id as u32,
                alt: i as u16,
                pos: alt.terms.len() as u16,
            };
            if chart[tokens.len()].contains(&expected) {
                return Ok(());
            }
        }
    }
    Err(ParseError::NotRecognized {
        columns: chart.len(),
        total: tokens.len() + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn recognize_str(grammar: &str, input: &str) -> Result<(), ParseError> {
        let mut g = Grammar::from_str(grammar).unwrap();
        let tokens = tokenize(&mut g, input).unwrap();
        let root = g.root_rule().to_string();
        recognize(&g, &root, &tokens)
    }

    #[test]
    fn handles_left_recursion() {
        let grammar = r#"
S ::= A
A ::= A "a" | "a"
"#;
        assert!(recognize_str(grammar, "a a a a").is_ok());
        assert!(recognize_str(grammar, "a").is_ok());
    }

    #[test]
    fn handles_ambiguity() {
        // Both associativities derive the input.
        let grammar = r#"
E ::= E "+" E | rx%[0-9]+%rx
"#;
        assert!(recognize_str(grammar, "1 + 2 + 3").is_ok());
    }

    #[test]
    fn rejects_with_column_count() {
        let grammar = r#"S ::= "a" S | "b""#;
        assert!(recognize_str(grammar, "a a b").is_ok());
        let err = recognize_str(grammar, "a a").unwrap_err();
        match err {
            ParseError::NotRecognized { columns, total } => {
                assert_eq!(columns, 3);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nullable_rules_complete_at_end_of_input() {
        let grammar = "S ::= \"a\" S | ";
        assert!(recognize_str(grammar, "a").is_ok());
        assert!(recognize_str(grammar, "a a a").is_ok());
        assert!(recognize_str(grammar, "").is_ok());
    }

    #[test]
    fn predictions_after_a_nullable_completion_still_advance() {
        // A derives empty, so its completion in column 0 can run before C
        // predicts A there; the late parent must still be advanced.
        let grammar = r#"
S ::= A C
C ::= A "c"
A ::= | "a"
"#;
        assert!(recognize_str(grammar, "c").is_ok());
        assert!(recognize_str(grammar, "a c").is_ok());
        assert!(recognize_str(grammar, "a").is_err());
    }

    #[test]
    fn vecset_keeps_insertion_order_and_dedups() {
        let mut set = VecSet::default();
        assert_eq!(set.insert("a"), 0);
        assert_eq!(set.insert("b"), 1);
        assert_eq!(set.insert("a"), 0);
        assert_eq!(set.len(), 2);
        assert_eq!(set[1], "b");
        assert!(set.contains(&"a"));
    }
}
