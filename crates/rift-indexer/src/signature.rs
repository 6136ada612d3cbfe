//! Formatting-insensitive signatures over tree-sitter subtrees.
//!
//! A signature hashes the leaf tokens of a subtree: comments and line
//! continuations are dropped, grouping parentheses are elided and a trailing
//! comma before a closing bracket is removed. Whitespace never reaches the
//! hash, so reflowing an expression across lines does not change it.
//!
//! Symbol signatures additionally mask callee names: renaming a called
//! function changes the call edges and call-site branches, not the callers.

use std::collections::HashSet;

use rift_core::signature::hash_tokens;
use tree_sitter::Node;

/// Node kinds that never contribute tokens.
const IGNORED_KINDS: &[&str] = &["comment", "line_continuation", "html_comment"];

/// Children holding a construct's body rather than its header.
const BODY_KINDS: &[&str] = &[
    "block",
    "statement_block",
    "elif_clause",
    "else_clause",
    "except_clause",
    "except_group_clause",
    "finally_clause",
    "catch_clause",
];
const BODY_FIELDS: &[&str] = &["body", "consequence", "alternative", "handler", "finalizer"];

const SNIPPET_LIMIT: usize = 70;
const MASKED_CALLEE: &str = "$callee";

/// Signature of the whole subtree.
pub fn node_signature(node: Node<'_>, source: &str) -> String {
    let mut tokens = Vec::new();
    collect_tokens(node, source, &mut tokens);
    hash_tokens(normalize(tokens))
}

/// Signature of a declared symbol: the whole subtree with callee names masked.
pub fn symbol_signature(node: Node<'_>, source: &str) -> String {
    let masked = callee_positions(node);
    let mut tokens = Vec::new();
    collect_masked(node, source, &masked, &mut tokens);
    hash_tokens(normalize(tokens))
}

/// Byte ranges of the name tokens of every call inside `root`.
fn callee_positions(root: Node<'_>) -> HashSet<(usize, usize)> {
    let mut positions = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if matches!(node.kind(), "call" | "call_expression") {
            let name = node.child_by_field_name("function").and_then(|f| match f.kind() {
                "identifier" => Some(f),
                "attribute" => f.child_by_field_name("attribute"),
                "member_expression" => f.child_by_field_name("property"),
                _ => None,
            });
            if let Some(name) = name {
                positions.insert((name.start_byte(), name.end_byte()));
            }
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    positions
}

/// Signature of a statement header: the subtree minus its body children.
pub fn header_signature(node: Node<'_>, source: &str) -> String {
    let mut tokens = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            let is_body = cursor.field_name().is_some_and(|f| BODY_FIELDS.contains(&f))
                || BODY_KINDS.contains(&child.kind());
            if !is_body {
                collect_tokens(child, source, &mut tokens);
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    } else {
        collect_tokens(node, source, &mut tokens);
    }
    hash_tokens(normalize(tokens))
}

/// Leaf tokens in source order. Iterative so deep nesting cannot overflow.
pub fn collect_tokens<'s>(root: Node<'_>, source: &'s str, out: &mut Vec<&'s str>) {
    collect_masked(root, source, &HashSet::new(), out);
}

fn collect_masked<'s>(root: Node<'_>, source: &'s str, masked: &HashSet<(usize, usize)>, out: &mut Vec<&'s str>) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_extra() || IGNORED_KINDS.contains(&node.kind()) {
            continue;
        }
        if node.child_count() == 0 {
            if masked.contains(&(node.start_byte(), node.end_byte())) {
                out.push(MASKED_CALLEE);
                continue;
            }
            if let Some(text) = source.get(node.byte_range()) {
                let text = text.trim();
                if !text.is_empty() {
                    out.push(text);
                }
            }
            continue;
        }
        let mut cursor = node.walk();
        let mut children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        if node.kind() == "parenthesized_expression" {
            strip_grouping(&mut children);
        }
        stack.extend(children.into_iter().rev());
    }
}

fn strip_grouping(children: &mut Vec<Node<'_>>) {
    if children.first().is_some_and(|c| c.kind() == "(") && children.last().is_some_and(|c| c.kind() == ")") {
        children.pop();
        children.remove(0);
    }
}

fn normalize(tokens: Vec<&str>) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if matches!(token, ")" | "]" | "}") && out.last() == Some(&",") {
            out.pop();
        }
        out.push(token);
    }
    out
}

/// First source line of a node, truncated for display.
pub fn snippet(node: Node<'_>, source: &str) -> String {
    let text = source.get(node.byte_range()).unwrap_or_default();
    let first_line = text.lines().next().unwrap_or_default().trim_end();
    if first_line.chars().count() <= SNIPPET_LIMIT {
        first_line.to_string()
    } else {
        let head: String = first_line.chars().take(SNIPPET_LIMIT - 3).collect();
        format!("{head}...")
    }
}

/// Source text of a node with whitespace runs collapsed.
pub fn compact_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.byte_range())
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 1-based inclusive line span.
pub fn line_span(node: Node<'_>) -> (u32, u32) {
    (
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FileType, parse};

    fn first_statement_signature(file_type: FileType, source: &str) -> String {
        let tree = parse(file_type, "t", source).unwrap();
        let root = tree.root_node();
        let stmt = root.named_child(0).unwrap();
        header_signature(stmt, source)
    }

    #[test]
    fn wrapped_condition_hashes_like_single_line() {
        let flat = first_statement_signature(FileType::Python, "if a and b:\n    pass\n");
        let wrapped = first_statement_signature(FileType::Python, "if (a and\n        b):  # check\n    pass\n");
        assert_eq!(flat, wrapped);
    }

    #[test]
    fn body_does_not_affect_header() {
        let one = first_statement_signature(FileType::Python, "if ready:\n    go()\n");
        let two = first_statement_signature(FileType::Python, "if ready:\n    stop()\n");
        assert_eq!(one, two);
        let other = first_statement_signature(FileType::Python, "if not ready:\n    go()\n");
        assert_ne!(one, other);
    }

    #[test]
    fn trailing_commas_and_comments_are_ignored() {
        let source_a = "call(a, b)\n";
        let source_b = "call(\n    a,  # first\n    b,\n)\n";
        let tree_a = parse(FileType::Python, "a", source_a).unwrap();
        let tree_b = parse(FileType::Python, "b", source_b).unwrap();
        assert_eq!(
            node_signature(tree_a.root_node(), source_a),
            node_signature(tree_b.root_node(), source_b)
        );
    }

    #[test]
    fn symbol_signature_ignores_callee_names() {
        let old = "def f(x):\n    return g(x) + obj.g(x)\n";
        let new = "def f(x):\n    return h(\n        x,\n    ) + obj.h(x)\n";
        let tree_old = parse(FileType::Python, "a", old).unwrap();
        let tree_new = parse(FileType::Python, "b", new).unwrap();
        let def_old = tree_old.root_node().named_child(0).unwrap();
        let def_new = tree_new.root_node().named_child(0).unwrap();
        assert_eq!(symbol_signature(def_old, old), symbol_signature(def_new, new));
        assert_ne!(node_signature(def_old, old), node_signature(def_new, new));
    }

    #[test]
    fn snippet_truncates_long_lines() {
        let source = format!("x = {}\n", "y + ".repeat(30));
        let tree = parse(FileType::Python, "s", &source).unwrap();
        let text = snippet(tree.root_node(), &source);
        assert_eq!(text.chars().count(), 70);
        assert!(text.ends_with("..."));
    }
}
