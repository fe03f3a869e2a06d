//! Syntax trees. Rule nodes have children, token leaves do not; the shape of
//! the tree is exactly the shape of the grammar that produced it.

use crate::intern::{Interner, Sym};

/// AST node. `children: Some` marks a rule node (`sym` is the rule name),
/// `None` a token leaf (`sym` is the token text).
///
/// Nodes produced by error recovery are "poisoned": their `token_count` is
/// stored XOR'd with `!0u32`, and the poison bit propagates to ancestors.
#[derive(Clone, Debug, Default)]
pub struct AstNode {
    pub children: Option<Vec<AstNode>>,
    pub token_count: u32,
    pub sym: Sym,
}

impl AstNode {
    pub fn new(children: Option<Vec<AstNode>>, token_count: u32, sym: Sym) -> Self {
        Self {
            children,
            token_count,
            sym,
        }
    }

    pub fn leaf(sym: Sym) -> Self {
        Self::new(None, 1, sym)
    }

    /// Did this subtree go through error recovery?
    pub fn is_poisoned(&self) -> bool {
        self.token_count >= 0x8000_0000
    }

    /// Token count with the poison encoding stripped.
    pub fn real_token_count(&self) -> u32 {
        if self.is_poisoned() {
            self.token_count ^ !0u32
        } else {
            self.token_count
        }
    }
}

// Trees can be thousands of levels deep; destruction must not recurse.
// Children are drained onto an explicit queue instead.
impl Drop for AstNode {
    fn drop(&mut self) {
        if let Some(first) = self.children.take() {
            let mut queue = vec![first];
            while let Some(batch) = queue.pop() {
                for mut node in batch.into_iter().rev() {
                    if let Some(c) = node.children.take() {
                        queue.push(c);
                    }
                    // node now holds only a None and two u32s.
                    std::mem::forget(node);
                }
            }
        }
    }
}

/// Depth-first pre-order visit. The callback returns whether to descend into
/// the node's children. Falls back to an explicit stack past a fixed depth so
/// pathological trees cannot overflow the stack.
pub fn visit(node: &AstNode, f: &mut dyn FnMut(&AstNode) -> bool) {
    visit_recursive(node, f, 0);
}

fn visit_recursive(node: &AstNode, f: &mut dyn FnMut(&AstNode) -> bool, depth: usize) {
    if depth > 100 {
        return visit_iterative(node, f);
    }
    if f(node) {
        if let Some(children) = &node.children {
            for c in children {
                visit_recursive(c, f, depth + 1);
            }
        }
    }
}

fn visit_iterative(node: &AstNode, f: &mut dyn FnMut(&AstNode) -> bool) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if f(node) {
            if let Some(children) = &node.children {
                // FILO stack, so push in reverse to keep pre-order.
                for c in children.iter().rev() {
                    stack.push(c);
                }
            }
        }
    }
}

/// Structure-only rendering for tests: parents are `+...-` (poisoned parents
/// `p+...-`), leaves are `.`.
pub fn shape_string(node: &AstNode) -> String {
    let mut s = String::new();
    shape_string_into(node, &mut s);
    s
}

fn shape_string_into(node: &AstNode, s: &mut String) {
    if let Some(children) = &node.children {
        if node.is_poisoned() {
            s.push('p');
        }
        s.push('+');
        for c in children {
            shape_string_into(c, s);
        }
        s.push('-');
    } else {
        s.push('.');
    }
}

/// Leaf texts in order, resolved through the interner.
pub fn leaf_texts(node: &AstNode, interner: &Interner) -> Vec<String> {
    let mut out = Vec::new();
    visit(node, &mut |n| {
        if n.children.is_none() {
            out.push(interner.resolve(n.sym).to_string());
        }
        true
    });
    out
}
