//! TypeScript, TSX and JavaScript extractor. The three grammars share node
//! kinds for everything extracted here.

use std::collections::BTreeMap;

use rift_core::NodeKind;
use tree_sitter::{Node, Tree};

use crate::error::AnalyzeError;
use crate::extractor::{Declared, FileBuilder, LanguageExtractor, Reference, qualify};
use crate::flow::{BranchSite, FlowBuilder, FlowStmt};
use crate::signature::compact_text;

pub struct TypeScriptExtractor;

#[derive(Debug, Clone)]
struct Scope {
    id: String,
    qualified: String,
    in_class: bool,
}

/// The callable whose body is being scanned.
#[derive(Debug, Clone)]
struct Owner {
    id: String,
    qualified: String,
    /// Source of `RENDERS` edges. Callbacks render on behalf of their owner.
    renders_as: String,
}

impl LanguageExtractor for TypeScriptExtractor {
    fn extract(&self, file: &mut FileBuilder<'_>, tree: &Tree) -> Result<(), AnalyzeError> {
        let root = tree.root_node();
        file.set_file_signature(root);
        let scope = Scope {
            id: file.file_id().to_string(),
            qualified: file.module_path().to_string(),
            in_class: false,
        };
        visit_children(file, root, &scope);
        Ok(())
    }
}

fn is_function_value(node: Node<'_>) -> bool {
    matches!(node.kind(), "arrow_function" | "function_expression" | "generator_function")
}

fn is_nested_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "class_declaration"
            | "abstract_class_declaration"
            | "method_definition"
    )
}

fn holds_statements(kind: &str) -> bool {
    matches!(
        kind,
        "program" | "statement_block" | "class_body" | "else_clause" | "catch_clause" | "finally_clause" | "switch_body"
            | "switch_case" | "switch_default"
    ) || kind.ends_with("_statement")
}

fn visit_children(file: &mut FileBuilder<'_>, node: Node<'_>, scope: &Scope) {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    for child in children {
        visit(file, child, scope);
    }
}

fn visit(file: &mut FileBuilder<'_>, node: Node<'_>, scope: &Scope) {
    match node.kind() {
        "import_statement" => {
            if let Some(source) = node.child_by_field_name("source") {
                let module = string_value(file.text(source));
                file.add_import(&module);
            }
        }
        "export_statement" => {
            if let Some(source) = node.child_by_field_name("source") {
                let module = string_value(file.text(source));
                file.add_import(&module);
            }
            visit_children(file, node, scope);
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                let name = file.text(name);
                function(file, node, node, name, scope);
            }
        }
        "class_declaration" | "abstract_class_declaration" => class(file, node, scope),
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarators: Vec<Node<'_>> = node
                .named_children(&mut cursor)
                .filter(|d| d.kind() == "variable_declarator")
                .collect();
            for declarator in declarators {
                let name = declarator.child_by_field_name("name").filter(|n| n.kind() == "identifier");
                let value = declarator.child_by_field_name("value").filter(|v| is_function_value(*v));
                if let (Some(name), Some(value)) = (name, value) {
                    let name = file.text(name);
                    function(file, value, declarator, name, scope);
                }
            }
        }
        "method_definition" if scope.in_class => {
            if let Some(name) = node.child_by_field_name("name") {
                let name = file.text(name);
                function(file, node, node, name, scope);
            }
        }
        "public_field_definition" | "field_definition" if scope.in_class => {
            let name = node
                .child_by_field_name("name")
                .or_else(|| node.child_by_field_name("property"));
            let value = node.child_by_field_name("value").filter(|v| is_function_value(*v));
            if let (Some(name), Some(value)) = (name, value) {
                let name = file.text(name);
                function(file, value, node, name, scope);
            }
        }
        kind if holds_statements(kind) => visit_children(file, node, scope),
        _ => {}
    }
}

fn class(file: &mut FileBuilder<'_>, node: Node<'_>, scope: &Scope) {
    let Some(name) = node.child_by_field_name("name") else {
        return;
    };
    let name = file.text(name);
    let mut metadata = BTreeMap::new();
    if let Some(doc) = documentation(file, node) {
        metadata.insert("documentation".to_string(), doc);
    }
    let declared = file.add_symbol(
        NodeKind::Class,
        name,
        &qualify(&scope.qualified, name),
        node,
        &scope.id,
        metadata,
    );

    let mut cursor = node.walk();
    let heritage = node.named_children(&mut cursor).find(|c| c.kind() == "class_heritage");
    if let Some(heritage) = heritage {
        let mut cursor = heritage.walk();
        let clauses: Vec<Node<'_>> = heritage.named_children(&mut cursor).collect();
        for clause in clauses {
            match clause.kind() {
                "extends_clause" => refer_types(file, clause, Reference::Extends, &declared.id),
                "implements_clause" => refer_types(file, clause, Reference::Implements, &declared.id),
                // JavaScript puts the base expression directly under the heritage.
                _ => {
                    if let Some(base) = type_name(clause) {
                        let base = file.text(base);
                        file.refer(Reference::Extends, &declared.id, base);
                    }
                }
            }
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        let inner = Scope {
            id: declared.id,
            qualified: declared.qualified_name,
            in_class: true,
        };
        visit_children(file, body, &inner);
    }
}

fn refer_types(file: &mut FileBuilder<'_>, clause: Node<'_>, reference: Reference, source: &str) {
    let mut cursor = clause.walk();
    let names: Vec<Node<'_>> = clause.named_children(&mut cursor).filter_map(type_name).collect();
    for name in names {
        let text = file.text(name);
        file.refer(reference, source, text);
    }
}

/// The simple name a heritage entry refers to.
fn type_name(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "identifier" | "type_identifier" => Some(node),
        "member_expression" => node.child_by_field_name("property"),
        "nested_type_identifier" => node.child_by_field_name("name"),
        "generic_type" => node.child_by_field_name("name").and_then(type_name),
        _ => None,
    }
}

/// Declare a named callable and build everything inside it.
fn function(file: &mut FileBuilder<'_>, node: Node<'_>, outer: Node<'_>, name: &str, scope: &Scope) {
    let body = node.child_by_field_name("body");
    let kind = if scope.in_class {
        NodeKind::Method
    } else if is_hook_name(name) {
        NodeKind::Hook
    } else if name.starts_with(|c: char| c.is_ascii_uppercase()) && body.is_some_and(contains_jsx) {
        NodeKind::Component
    } else {
        NodeKind::Function
    };
    let metadata = callable_metadata(file, node, outer);
    let declared = file.add_symbol(kind, name, &qualify(&scope.qualified, name), outer, &scope.id, metadata);
    let renders_as = declared.id.clone();
    callable_body(file, node, declared, renders_as);
}

/// `items.map((x) => ...)` inside `owner` becomes `{owner}.map$callback@L{line}`.
fn callback(file: &mut FileBuilder<'_>, node: Node<'_>, owner: &Owner, callee: &str) {
    let line = node.start_position().row + 1;
    let name = format!("{callee}$callback");
    let qualified = format!("{}.{name}@L{line}", owner.qualified);
    let metadata = callable_metadata(file, node, node);
    let declared = file.add_symbol(NodeKind::Function, &name, &qualified, node, &owner.id, metadata);
    callable_body(file, node, declared, owner.renders_as.clone());
}

fn callable_body(file: &mut FileBuilder<'_>, node: Node<'_>, declared: Declared, renders_as: String) {
    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let owner = Owner {
        id: declared.id,
        qualified: declared.qualified_name,
        renders_as,
    };
    scan(file, body, &owner);

    let stmts = if body.kind() == "statement_block" {
        lower_block(body, file.source())
    } else {
        // Expression-bodied arrow: an implicit return.
        vec![FlowStmt::Exit(BranchSite::from_node("return", body, file.source()))]
    };
    FlowBuilder::new(file, &owner.id, &owner.qualified).build(&stmts);

    if body.kind() == "statement_block" {
        let inner = Scope {
            id: owner.id,
            qualified: owner.qualified,
            in_class: false,
        };
        visit_children(file, body, &inner);
    }
}

fn callable_metadata(file: &FileBuilder<'_>, node: Node<'_>, outer: Node<'_>) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    let params = match (node.child_by_field_name("parameters"), node.child_by_field_name("parameter")) {
        (Some(params), _) => compact_text(params, file.source()),
        (None, Some(param)) => format!("({})", compact_text(param, file.source())),
        (None, None) => "()".to_string(),
    };
    metadata.insert("params".to_string(), params);
    if let Some(returns) = node.child_by_field_name("return_type") {
        let text = compact_text(returns, file.source());
        metadata.insert("returnType".to_string(), text.trim_start_matches(':').trim().to_string());
    }
    if let Some(doc) = documentation(file, outer) {
        metadata.insert("documentation".to_string(), doc);
    }
    metadata
}

fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
}

fn contains_jsx(body: Node<'_>) -> bool {
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "jsx_element" | "jsx_self_closing_element" | "jsx_fragment" => return true,
            kind if node != body && is_nested_declaration(kind) => continue,
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    false
}

/// `/** ... */` block directly above a declaration.
fn documentation(file: &FileBuilder<'_>, outer: Node<'_>) -> Option<String> {
    let mut anchor = outer;
    while let Some(parent) = anchor.parent() {
        if !matches!(parent.kind(), "export_statement" | "lexical_declaration" | "variable_declaration") {
            break;
        }
        anchor = parent;
    }
    let comment = anchor.prev_named_sibling().filter(|c| c.kind() == "comment")?;
    let text = file.text(comment).strip_prefix("/**")?.trim_end_matches("*/");
    let doc = text
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!doc.is_empty()).then_some(doc)
}

/// Record calls, hook uses, renders and callbacks made directly by a body.
/// Nested declarations are skipped; they are visited as symbols of their own.
fn scan(file: &mut FileBuilder<'_>, body: Node<'_>, owner: &Owner) {
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        if node != body {
            if is_nested_declaration(node.kind()) {
                continue;
            }
            if is_function_value(node) {
                let parent = node.parent();
                match parent.map(|p| p.kind()) {
                    Some("arguments") => {
                        let callee = parent
                            .and_then(|args| args.parent())
                            .map(|call| callee_name(call, file.source()))
                            .unwrap_or_else(|| "call".to_string());
                        callback(file, node, owner, &callee);
                        continue;
                    }
                    Some("variable_declarator") | Some("public_field_definition") | Some("field_definition") => continue,
                    _ => {}
                }
            }
        }

        match node.kind() {
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = match function.kind() {
                        "identifier" => Some(function),
                        "member_expression" => function
                            .child_by_field_name("object")
                            .filter(|o| o.kind() == "this")
                            .and_then(|_| function.child_by_field_name("property")),
                        _ => None,
                    };
                    if let Some(callee) = callee {
                        let text = file.text(callee);
                        file.refer(Reference::Call, &owner.id, text);
                    }
                }
            }
            "jsx_opening_element" | "jsx_self_closing_element" => {
                let tag = node
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier")
                    .map(|n| file.text(n))
                    .filter(|t| t.starts_with(|c: char| c.is_ascii_uppercase()));
                if let Some(tag) = tag {
                    file.refer(Reference::Renders, &owner.renders_as, tag);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

fn string_value(literal: &str) -> String {
    literal.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn lower_block(block: Node<'_>, source: &str) -> Vec<FlowStmt> {
    let mut cursor = block.walk();
    block
        .named_children(&mut cursor)
        .filter(|stmt| !stmt.is_extra())
        .map(|stmt| lower_stmt(stmt, source))
        .collect()
}

/// A statement position that may hold a block or a single statement.
fn lower_body(node: Option<Node<'_>>, source: &str) -> Vec<FlowStmt> {
    match node {
        Some(block) if block.kind() == "statement_block" => lower_block(block, source),
        Some(stmt) => vec![lower_stmt(stmt, source)],
        None => Vec::new(),
    }
}

fn lower_stmt(stmt: Node<'_>, source: &str) -> FlowStmt {
    match stmt.kind() {
        "if_statement" => lower_if("if", stmt, source),
        "return_statement" => FlowStmt::Exit(BranchSite::from_node("return", stmt, source)),
        "throw_statement" => FlowStmt::Exit(BranchSite::from_node("throw", stmt, source)),
        "for_statement" | "for_in_statement" | "while_statement" | "do_statement" => {
            let kind = match stmt.kind() {
                "while_statement" => "while",
                "do_statement" => "do",
                _ => "for",
            };
            FlowStmt::Loop {
                site: BranchSite::from_node(kind, stmt, source),
                body: lower_body(stmt.child_by_field_name("body"), source),
            }
        }
        "try_statement" => FlowStmt::Try {
            site: BranchSite::from_node("try", stmt, source).with_snippet("try {"),
            body: lower_body(stmt.child_by_field_name("body"), source),
            handlers: stmt
                .child_by_field_name("handler")
                .map(|catch| vec![lower_body(catch.child_by_field_name("body"), source)])
                .unwrap_or_default(),
            finally: stmt
                .child_by_field_name("finalizer")
                .map(|finally| lower_body(finally.child_by_field_name("body"), source)),
        },
        "statement_block" => FlowStmt::Sequence(lower_block(stmt, source)),
        "expression_statement" | "lexical_declaration" | "variable_declaration" => match statement_call(stmt) {
            Some(call) => FlowStmt::Call(BranchSite::from_node("call", stmt, source).with_callee(callee_name(call, source))),
            None => FlowStmt::Opaque { falls: true },
        },
        _ => FlowStmt::Opaque { falls: true },
    }
}

/// `if`, with `else if` chains lowered as nested `elif` branches.
fn lower_if(kind: &'static str, node: Node<'_>, source: &str) -> FlowStmt {
    let else_body = node.child_by_field_name("alternative").map(|clause| {
        match clause.named_children(&mut clause.walk()).find(|c| !c.is_extra()) {
            Some(nested) if nested.kind() == "if_statement" => vec![lower_if("elif", nested, source)],
            other => lower_body(other, source),
        }
    });
    FlowStmt::If {
        site: BranchSite::from_node(kind, node, source),
        truth: node.child_by_field_name("condition").and_then(known_truth),
        then_body: lower_body(node.child_by_field_name("consequence"), source),
        else_body,
    }
}

fn known_truth(expr: Node<'_>) -> Option<bool> {
    match expr.kind() {
        "true" => Some(true),
        "false" | "null" | "undefined" => Some(false),
        "parenthesized_expression" => expr.named_child(0).and_then(known_truth),
        "unary_expression" => {
            let negation = expr.child_by_field_name("operator").is_some_and(|op| op.kind() == "!");
            if !negation {
                return None;
            }
            expr.child_by_field_name("argument").and_then(known_truth).map(|v| !v)
        }
        _ => None,
    }
}

fn statement_call(stmt: Node<'_>) -> Option<Node<'_>> {
    let mut value = match stmt.kind() {
        "expression_statement" => stmt.named_child(0)?,
        _ => {
            let mut cursor = stmt.walk();
            let declarators: Vec<Node<'_>> = stmt
                .named_children(&mut cursor)
                .filter(|d| d.kind() == "variable_declarator")
                .collect();
            match declarators.as_slice() {
                [single] => single.child_by_field_name("value")?,
                _ => return None,
            }
        }
    };
    if matches!(value.kind(), "assignment_expression" | "augmented_assignment_expression") {
        value = value.child_by_field_name("right")?;
    }
    if value.kind() == "await_expression" {
        value = value.named_child(0)?;
    }
    (value.kind() == "call_expression").then_some(value)
}

fn callee_name(call: Node<'_>, source: &str) -> String {
    let name = match call.child_by_field_name("function") {
        Some(f) if f.kind() == "identifier" => Some(f),
        Some(f) if f.kind() == "member_expression" => f.child_by_field_name("property"),
        _ => None,
    };
    name.and_then(|n| source.get(n.byte_range()))
        .unwrap_or("call")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rift_core::{EdgeKind, GraphNode, Language, SnapshotGraph};

    use super::*;
    use crate::extractor::SnapshotMeta;
    use crate::parser::{FileType, parse};

    fn extract(file_type: FileType, path: &str, source: &str) -> SnapshotGraph {
        let meta = SnapshotMeta::new("r", "s", "HEAD");
        let tree = parse(file_type, path, source).unwrap();
        let mut file = FileBuilder::new(&meta, path, file_type.language(), source);
        TypeScriptExtractor.extract(&mut file, &tree).unwrap();
        let result = file.finish();
        SnapshotGraph {
            nodes: result.nodes,
            edges: result.edges,
            ..SnapshotGraph::new("r", "s", "HEAD")
        }
    }

    fn node<'g>(graph: &'g SnapshotGraph, qualified: &str) -> &'g GraphNode {
        graph
            .nodes
            .iter()
            .find(|n| n.qualified_name == qualified)
            .unwrap_or_else(|| panic!("no node {qualified}"))
    }

    fn edges(graph: &SnapshotGraph, kind: EdgeKind) -> BTreeSet<(String, String)> {
        let names = |id: &str| {
            graph
                .nodes
                .iter()
                .find(|n| n.id == id)
                .map(|n| n.qualified_name.clone())
                .unwrap_or_default()
        };
        graph
            .edges
            .iter()
            .filter(|e| e.kind == kind && !e.is_flow() && !e.is_call_site())
            .map(|e| (names(&e.source), names(&e.target)))
            .collect()
    }

    const LIST_TSX: &str = r#"import { useState } from 'react';

/** Counts up from `start`. */
function useCounter(start: number): number {
  const [n, setN] = useState(start);
  return n;
}

export const Item = ({ label }: { label: string }) => <li>{label}</li>;

export function List({ items }: { items: string[] }) {
  const n = useCounter(0);
  if (!items.length) {
    return null;
  } else if (n > 1) {
    log(n);
  }
  return <ul>{items.map((i) => <Item label={i} />)}</ul>;
}

function log(value: number) {
  console.info(value);
}
"#;

    #[test]
    fn classifies_hooks_components_and_functions() {
        let graph = extract(FileType::Tsx, "ui/list.tsx", LIST_TSX);
        assert!(graph.validate().is_ok());
        assert_eq!(node(&graph, "ui.list.useCounter").kind, NodeKind::Hook);
        assert_eq!(node(&graph, "ui.list.useCounter").meta("returnType"), Some("number"));
        assert_eq!(
            node(&graph, "ui.list.useCounter").meta("documentation"),
            Some("Counts up from `start`.")
        );
        assert_eq!(node(&graph, "ui.list.Item").kind, NodeKind::Component);
        assert_eq!(node(&graph, "ui.list.List").kind, NodeKind::Component);
        assert_eq!(node(&graph, "ui.list.log").kind, NodeKind::Function);
        assert!(graph.nodes.iter().any(|n| n.kind == NodeKind::Module && n.qualified_name == "react"));
    }

    #[test]
    fn component_edges_and_callbacks() {
        let graph = extract(FileType::Tsx, "ui/list.tsx", LIST_TSX);
        assert!(edges(&graph, EdgeKind::UsesHook).contains(&("ui.list.List".into(), "ui.list.useCounter".into())));
        assert!(edges(&graph, EdgeKind::Renders).contains(&("ui.list.List".into(), "ui.list.Item".into())));
        assert!(edges(&graph, EdgeKind::Calls).contains(&("ui.list.List".into(), "ui.list.log".into())));

        let callback = graph
            .nodes
            .iter()
            .find(|n| n.qualified_name == "ui.list.List.map$callback@L18")
            .expect("callback node");
        assert_eq!(callback.kind, NodeKind::Function);
        assert!(edges(&graph, EdgeKind::Declares).contains(&(
            "ui.list.List".into(),
            "ui.list.List.map$callback@L18".into()
        )));
    }

    #[test]
    fn skeleton_uses_elif_for_else_if() {
        let graph = extract(FileType::Tsx, "ui/list.tsx", LIST_TSX);
        let branches: BTreeSet<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Branch && n.meta("owner") == Some("ui.list.List"))
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(
            branches,
            ["call#0", "if#0", "return#0", "elif#0", "call#1", "return#1"].into_iter().collect()
        );
        assert_eq!(node(&graph, "ui.list.List::call#0").meta("callee"), Some("useCounter"));
        let flow_types: BTreeSet<&str> = graph
            .edges
            .iter()
            .filter(|e| e.source.ends_with("List::if#0"))
            .filter_map(|e| e.flow_type().map(|f| f.as_str()))
            .collect();
        assert_eq!(flow_types, ["true", "false"].into_iter().collect());
    }

    #[test]
    fn class_heritage_and_private_methods() {
        let graph = extract(
            FileType::TypeScript,
            "store.ts",
            "class Base {}\nclass Saver {}\nclass Store extends Base implements Saver {\n  #secret() { return 1; }\n  save() { this.#secret(); }\n}\n",
        );
        assert!(edges(&graph, EdgeKind::Extends).contains(&("store.Store".into(), "store.Base".into())));
        assert!(edges(&graph, EdgeKind::Implements).contains(&("store.Store".into(), "store.Saver".into())));
        assert_eq!(node(&graph, "store.Store.#secret").kind, NodeKind::Method);
        assert!(edges(&graph, EdgeKind::Calls).contains(&("store.Store.save".into(), "store.Store.#secret".into())));
    }

    #[test]
    fn javascript_classes_extend_plain_identifiers() {
        let graph = extract(
            FileType::JavaScript,
            "app.js",
            "class Base {}\nclass App extends Base {\n  run() { if (true) { return 1; } else { return 2; } }\n}\n",
        );
        assert!(edges(&graph, EdgeKind::Extends).contains(&("app.App".into(), "app.Base".into())));
        // The constant condition prunes the else side.
        let false_edges = graph
            .edges
            .iter()
            .filter(|e| e.source.ends_with("App.run::if#0") && e.flow_type() == Some(rift_core::FlowType::False))
            .count();
        assert_eq!(false_edges, 0);
    }

    #[test]
    fn callbacks_without_owner_name_collision() {
        let graph = extract(
            FileType::JavaScript,
            "effects.js",
            "function App() {\n  useEffect(() => { load(); });\n  useEffect(() => { save(); });\n}\nfunction load() {}\nfunction save() {}\n",
        );
        let callbacks: Vec<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.name == "useEffect$callback")
            .map(|n| n.qualified_name.as_str())
            .collect();
        assert_eq!(callbacks.len(), 2);
        assert!(callbacks.contains(&"effects.App.useEffect$callback@L2"));
        assert!(callbacks.contains(&"effects.App.useEffect$callback@L3"));
        assert!(edges(&graph, EdgeKind::Calls).contains(&(
            "effects.App.useEffect$callback@L2".into(),
            "effects.load".into()
        )));
    }
}
