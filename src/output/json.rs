use serde_json::{json, Map, Value};

use crate::ast::AstNode;
use crate::intern::Interner;
use crate::lexer::Token;

/// Syntax tree as a JSON document. Leaves are `{"token": text}`, rule nodes
/// carry their name, consumed token count, and children.
pub fn ast_value(node: &AstNode, interner: &Interner) -> Value {
    match &node.children {
        Some(children) => {
            let mut obj = Map::new();
            obj.insert("rule".into(), interner.resolve(node.sym).into());
            obj.insert("tokens".into(), node.real_token_count().into());
            if node.is_poisoned() {
                obj.insert("poisoned".into(), true.into());
            }
            obj.insert(
                "children".into(),
                Value::Array(children.iter().map(|c| ast_value(c, interner)).collect()),
            );
            Value::Object(obj)
        }
        None => json!({ "token": interner.resolve(node.sym) }),
    }
}

/// One token as a JSONL record.
pub fn token_value(index: usize, token: &Token, interner: &Interner) -> Value {
    let mut obj = Map::new();
    obj.insert("index".into(), index.into());
    obj.insert("text".into(), interner.resolve(token.sym).into());
    if token.pair != 0 {
        obj.insert("pair".into(), token.pair.into());
    }
    Value::Object(obj)
}
