use std::io::{self, Write};

use colored::Colorize;

use crate::ast::AstNode;
use crate::intern::Interner;
use crate::lexer::Token;

/// Render a syntax tree, one node per line, children indented. Rule names
/// are colored; nodes produced by error recovery are flagged.
pub fn write_tree(w: &mut dyn Write, ast: &AstNode, interner: &Interner) -> io::Result<()> {
    write_tree_at(w, ast, interner, 0)
}

fn write_tree_at(
    w: &mut dyn Write,
    node: &AstNode,
    interner: &Interner,
    indent: usize,
) -> io::Result<()> {
    let pad = " ".repeat(indent);
    match &node.children {
        Some(children) => {
            let name = interner.resolve(node.sym);
            let name = if node.is_poisoned() {
                format!("{} {}", name.red().bold(), "(recovered)".dimmed())
            } else {
                name.cyan().to_string()
            };
            writeln!(w, "{pad}{name} {{")?;
            for c in children {
                write_tree_at(w, c, interner, indent + 1)?;
            }
            writeln!(w, "{pad}}}")
        }
        None => writeln!(w, "{pad}{}", interner.resolve(node.sym)),
    }
}

/// One token per line: index, text, and the bracket pair offset when set.
pub fn write_tokens(w: &mut dyn Write, tokens: &[Token], interner: &Interner) -> io::Result<()> {
    for (i, t) in tokens.iter().enumerate() {
        if t.pair != 0 {
            writeln!(w, "{i}\t{}\tpair {:+}", interner.resolve(t.sym), t.pair)?;
        } else {
            writeln!(w, "{i}\t{}", interner.resolve(t.sym))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_rendering_indents_children() {
        colored::control::set_override(false);
        let mut interner = Interner::default();
        let s = interner.intern("S");
        let a = interner.intern("a");
        let tree = AstNode::new(
            Some(vec![AstNode::leaf(a), AstNode::new(Some(vec![]), 0, s)]),
            1,
            s,
        );
        let mut out = Vec::new();
        write_tree(&mut out, &tree, &interner).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "S {\n a\n S {\n }\n}\n");
    }

    #[test]
    fn token_listing_shows_pairs() {
        let mut interner = Interner::default();
        let open = interner.intern("(");
        let close = interner.intern(")");
        let tokens = vec![
            Token { sym: open, pair: 1 },
            Token { sym: close, pair: -1 },
        ];
        let mut out = Vec::new();
        write_tokens(&mut out, &tokens, &interner).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "0\t(\tpair +1\n1\t)\tpair -1\n");
    }
}
