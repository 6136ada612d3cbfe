//! Python language extractor using tree-sitter

use std::collections::BTreeMap;

use rift_core::{EdgeKind, NodeKind};
use tree_sitter::{Node, Tree};

use crate::error::AnalyzeError;
use crate::extractor::{FileBuilder, LanguageExtractor, Reference, qualify};
use crate::flow::{BranchSite, FlowBuilder, FlowStmt};
use crate::signature::compact_text;

/// Decorator attributes that declare an HTTP route.
const ROUTE_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options", "route"];

pub struct PythonExtractor;

#[derive(Debug, Clone)]
struct Scope {
    id: String,
    qualified: String,
    in_class: bool,
}

impl LanguageExtractor for PythonExtractor {
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

fn holds_statements(kind: &str) -> bool {
    matches!(kind, "module" | "block") || kind.ends_with("_statement") || kind.ends_with("_clause")
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
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let module = match child.kind() {
                    "aliased_import" => child.child_by_field_name("name"),
                    "dotted_name" => Some(child),
                    _ => None,
                };
                if let Some(module) = module {
                    let text = file.text(module);
                    file.add_import(text);
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                let text = file.text(module);
                file.add_import(text);
            }
        }
        "class_definition" => class(file, node, node, scope, Vec::new()),
        "function_definition" => function(file, node, node, scope, Vec::new()),
        "decorated_definition" => {
            let decorators = decorators(file, node);
            match node.child_by_field_name("definition") {
                Some(def) if def.kind() == "class_definition" => class(file, def, node, scope, decorators),
                Some(def) if def.kind() == "function_definition" => function(file, def, node, scope, decorators),
                _ => {}
            }
        }
        kind if holds_statements(kind) => visit_children(file, node, scope),
        _ => {}
    }
}

struct Decorator<'t> {
    name: String,
    expr: Node<'t>,
}

fn decorators<'t>(file: &FileBuilder<'_>, decorated: Node<'t>) -> Vec<Decorator<'t>> {
    let mut cursor = decorated.walk();
    decorated
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "decorator")
        .filter_map(|decorator| decorator.named_child(0))
        .map(|expr| {
            let head = match expr.kind() {
                "call" => expr.child_by_field_name("function").unwrap_or(expr),
                _ => expr,
            };
            Decorator {
                name: compact_text(head, file.source()),
                expr,
            }
        })
        .collect()
}

fn class(file: &mut FileBuilder<'_>, node: Node<'_>, outer: Node<'_>, scope: &Scope, decorators: Vec<Decorator<'_>>) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = file.text(name_node);
    let kind = if name.ends_with("Controller") {
        NodeKind::Controller
    } else if name.ends_with("Service") {
        NodeKind::Service
    } else {
        NodeKind::Class
    };
    let mut metadata = BTreeMap::new();
    if !decorators.is_empty() {
        metadata.insert("decorators".to_string(), join_names(&decorators));
    }
    let declared = file.add_symbol(kind, name, &qualify(&scope.qualified, name), outer, &scope.id, metadata);

    if let Some(bases) = node.child_by_field_name("superclasses") {
        let mut cursor = bases.walk();
        for base in bases.named_children(&mut cursor) {
            let base_name = match base.kind() {
                "identifier" => Some(base),
                "attribute" => base.child_by_field_name("attribute"),
                _ => None,
            };
            if let Some(base_name) = base_name {
                let text = file.text(base_name);
                file.refer(Reference::Extends, &declared.id, text);
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

fn function(file: &mut FileBuilder<'_>, node: Node<'_>, outer: Node<'_>, scope: &Scope, decorators: Vec<Decorator<'_>>) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = file.text(name_node);
    let kind = if scope.in_class {
        NodeKind::Method
    } else {
        NodeKind::Function
    };
    let body = node.child_by_field_name("body");

    let mut metadata = BTreeMap::new();
    metadata.insert("params".to_string(), params(file, node));
    if let Some(returns) = node.child_by_field_name("return_type") {
        metadata.insert("returnType".to_string(), compact_text(returns, file.source()));
    }
    if let Some(doc) = body.and_then(|b| docstring(file, b)) {
        metadata.insert("documentation".to_string(), doc);
    }
    if !decorators.is_empty() {
        metadata.insert("decorators".to_string(), join_names(&decorators));
    }
    let declared = file.add_symbol(kind, name, &qualify(&scope.qualified, name), outer, &scope.id, metadata);

    for decorator in &decorators {
        endpoint(file, decorator, &declared.id, &declared.qualified_name);
    }

    let Some(body) = body else {
        return;
    };
    scan_calls(file, body, &declared.id);
    let stmts = lower_block(body, file.source());
    FlowBuilder::new(file, &declared.id, &declared.qualified_name).build(&stmts);

    let inner = Scope {
        id: declared.id,
        qualified: declared.qualified_name,
        in_class: false,
    };
    visit_children(file, body, &inner);
}

fn join_names(decorators: &[Decorator<'_>]) -> String {
    decorators
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// `@app.get("/users")` → `Endpoint "GET /users"` exposed by the function.
fn endpoint(file: &mut FileBuilder<'_>, decorator: &Decorator<'_>, function_id: &str, function_qualified: &str) {
    let expr = decorator.expr;
    if expr.kind() != "call" {
        return;
    }
    let Some(attribute) = expr
        .child_by_field_name("function")
        .filter(|f| f.kind() == "attribute")
        .and_then(|f| f.child_by_field_name("attribute"))
    else {
        return;
    };
    let verb = file.text(attribute);
    if !ROUTE_METHODS.contains(&verb) {
        return;
    }
    let Some(arguments) = expr.child_by_field_name("arguments") else {
        return;
    };

    let mut route = None;
    let mut methods = None;
    let mut cursor = arguments.walk();
    for arg in arguments.named_children(&mut cursor) {
        match arg.kind() {
            "string" if route.is_none() => route = Some(string_value(file.text(arg))),
            "keyword_argument" => {
                let key = arg.child_by_field_name("name").map(|n| file.text(n));
                let value = arg.child_by_field_name("value");
                match (key, value) {
                    (Some("path"), Some(value)) if value.kind() == "string" => {
                        route = Some(string_value(file.text(value)));
                    }
                    (Some("methods"), Some(value)) => {
                        let mut inner = value.walk();
                        methods = value
                            .named_children(&mut inner)
                            .find(|item| item.kind() == "string")
                            .map(|item| string_value(file.text(item)).to_uppercase());
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
    let Some(route) = route else {
        return;
    };
    let method = match verb {
        "route" => methods.unwrap_or_else(|| "GET".to_string()),
        other => other.to_uppercase(),
    };

    let name = format!("{method} {route}");
    let mut metadata = BTreeMap::new();
    metadata.insert("httpMethod".to_string(), method);
    metadata.insert("route".to_string(), route);
    let declared = file.add_symbol(
        NodeKind::Endpoint,
        &name,
        &qualify(function_qualified, &name),
        expr,
        function_id,
        metadata,
    );
    file.add_edge(EdgeKind::ExposesEndpoint, function_id, &declared.id, None, false);
}

/// Text of a string literal without prefix or quotes.
fn string_value(literal: &str) -> String {
    literal
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn params(file: &FileBuilder<'_>, function: Node<'_>) -> String {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return "()".to_string();
    };
    let mut cursor = parameters.walk();
    let rendered: Vec<String> = parameters
        .named_children(&mut cursor)
        .filter(|p| !p.is_extra())
        .map(|p| match p.kind() {
            "default_parameter" => p
                .child_by_field_name("name")
                .map(|n| compact_text(n, file.source()))
                .unwrap_or_default(),
            "typed_default_parameter" => {
                let name = p.child_by_field_name("name").map(|n| file.text(n)).unwrap_or_default();
                match p.child_by_field_name("type") {
                    Some(ty) => format!("{name}: {}", compact_text(ty, file.source())),
                    None => name.to_string(),
                }
            }
            _ => compact_text(p, file.source()),
        })
        .collect();
    format!("({})", rendered.join(", "))
}

fn docstring(file: &FileBuilder<'_>, body: Node<'_>) -> Option<String> {
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).find(|n| !n.is_extra())?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0).filter(|n| n.kind() == "string")?;
    let text = string_value(file.text(literal));
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

/// Record `CALLS` references for calls made directly by a function body:
/// plain names and methods invoked on `self` or `cls`.
fn scan_calls(file: &mut FileBuilder<'_>, body: Node<'_>, caller: &str) {
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        if node != body && matches!(node.kind(), "function_definition" | "class_definition" | "decorated_definition") {
            continue;
        }
        if node.kind() == "call" {
            if let Some(function) = node.child_by_field_name("function") {
                let callee = match function.kind() {
                    "identifier" => Some(function),
                    "attribute" => function
                        .child_by_field_name("object")
                        .filter(|o| matches!(file.text(*o), "self" | "cls"))
                        .and_then(|_| function.child_by_field_name("attribute")),
                    _ => None,
                };
                if let Some(callee) = callee {
                    let text = file.text(callee);
                    file.refer(Reference::Call, caller, text);
                }
            }
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
}

fn block_of(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("body").or_else(|| {
        let mut cursor = node.walk();
        node.named_children(&mut cursor).find(|c| c.kind() == "block")
    })
}

fn lower_block(block: Node<'_>, source: &str) -> Vec<FlowStmt> {
    let mut cursor = block.walk();
    block
        .named_children(&mut cursor)
        .filter(|stmt| !stmt.is_extra())
        .map(|stmt| lower_stmt(stmt, source))
        .collect()
}

fn lower_optional(block: Option<Node<'_>>, source: &str) -> Vec<FlowStmt> {
    block.map(|b| lower_block(b, source)).unwrap_or_default()
}

fn lower_stmt(stmt: Node<'_>, source: &str) -> FlowStmt {
    match stmt.kind() {
        "if_statement" => {
            let mut cursor = stmt.walk();
            let alternatives: Vec<Node<'_>> = stmt.children_by_field_name("alternative", &mut cursor).collect();
            lower_conditional("if", stmt, &alternatives, source)
        }
        "return_statement" => FlowStmt::Exit(BranchSite::from_node("return", stmt, source)),
        "raise_statement" => FlowStmt::Exit(BranchSite::from_node("raise", stmt, source)),
        "for_statement" | "while_statement" => FlowStmt::Loop {
            site: BranchSite::from_node(if stmt.kind() == "for_statement" { "for" } else { "while" }, stmt, source),
            body: lower_optional(stmt.child_by_field_name("body"), source),
        },
        "try_statement" => {
            let mut body = lower_optional(stmt.child_by_field_name("body"), source);
            let mut handlers = Vec::new();
            let mut finally = None;
            let mut cursor = stmt.walk();
            for clause in stmt.named_children(&mut cursor) {
                match clause.kind() {
                    "except_clause" | "except_group_clause" => handlers.push(lower_optional(block_of(clause), source)),
                    "else_clause" => body.extend(lower_optional(block_of(clause), source)),
                    "finally_clause" => finally = Some(lower_optional(block_of(clause), source)),
                    _ => {}
                }
            }
            FlowStmt::Try {
                site: BranchSite::from_node("try", stmt, source).with_snippet("try:"),
                body,
                handlers,
                finally,
            }
        }
        "with_statement" => FlowStmt::Scoped {
            site: BranchSite::from_node("with", stmt, source),
            body: lower_optional(stmt.child_by_field_name("body"), source),
        },
        "expression_statement" => match statement_call(stmt) {
            Some(call) => FlowStmt::Call(BranchSite::from_node("call", stmt, source).with_callee(callee_name(call, source))),
            None => FlowStmt::Opaque { falls: true },
        },
        _ => FlowStmt::Opaque { falls: true },
    }
}

/// Lower an `if`/`elif` with its remaining `elif`/`else` alternatives.
fn lower_conditional(kind: &'static str, node: Node<'_>, alternatives: &[Node<'_>], source: &str) -> FlowStmt {
    let else_body = alternatives.split_first().map(|(next, rest)| match next.kind() {
        "elif_clause" => vec![lower_conditional("elif", *next, rest, source)],
        _ => lower_optional(block_of(*next), source),
    });
    FlowStmt::If {
        site: BranchSite::from_node(kind, node, source),
        truth: node.child_by_field_name("condition").and_then(known_truth),
        then_body: lower_optional(node.child_by_field_name("consequence"), source),
        else_body,
    }
}

fn known_truth(expr: Node<'_>) -> Option<bool> {
    match expr.kind() {
        "true" => Some(true),
        "false" | "none" => Some(false),
        "not_operator" => expr.child_by_field_name("argument").and_then(known_truth).map(|v| !v),
        "parenthesized_expression" => expr.named_child(0).and_then(known_truth),
        _ => None,
    }
}

/// The call performed by an expression, assignment or awaited statement.
fn statement_call(stmt: Node<'_>) -> Option<Node<'_>> {
    let mut value = stmt.named_child(0)?;
    if matches!(value.kind(), "assignment" | "augmented_assignment") {
        value = value.child_by_field_name("right")?;
    }
    if value.kind() == "await" {
        value = value.named_child(0)?;
    }
    (value.kind() == "call").then_some(value)
}

fn callee_name(call: Node<'_>, source: &str) -> String {
    let function = call.child_by_field_name("function");
    let name = match function {
        Some(f) if f.kind() == "identifier" => Some(f),
        Some(f) if f.kind() == "attribute" => f.child_by_field_name("attribute"),
        _ => None,
    };
    name.and_then(|n| source.get(n.byte_range()))
        .unwrap_or("call")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rift_core::{GraphNode, Language, SnapshotGraph};

    use super::*;
    use crate::extractor::SnapshotMeta;
    use crate::parser::{FileType, parse};

    fn extract(path: &str, source: &str) -> SnapshotGraph {
        let meta = SnapshotMeta::new("r", "s", "HEAD");
        let tree = parse(FileType::Python, path, source).unwrap();
        let mut file = FileBuilder::new(&meta, path, Language::Python, source);
        PythonExtractor.extract(&mut file, &tree).unwrap();
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
            .filter(|e| e.kind == kind && !e.is_flow())
            .map(|e| (names(&e.source), names(&e.target)))
            .collect()
    }

    #[test]
    fn declares_classes_methods_and_imports() {
        let graph = extract(
            "pkg/users.py",
            "import os.path\nfrom typing import List\n\nclass Base:\n    pass\n\nclass UserService(Base):\n    def load(self, uid: int) -> dict:\n        \"\"\"Load one user.\"\"\"\n        return self.fetch(uid)\n\n    def fetch(self, uid):\n        return {}\n",
        );
        assert!(graph.validate().is_ok());
        assert_eq!(node(&graph, "pkg.users.UserService").kind, NodeKind::Service);
        let load = node(&graph, "pkg.users.UserService.load");
        assert_eq!(load.kind, NodeKind::Method);
        assert_eq!(load.meta("params"), Some("(self, uid: int)"));
        assert_eq!(load.meta("returnType"), Some("dict"));
        assert_eq!(load.meta("documentation"), Some("Load one user."));

        let imports: BTreeSet<String> = graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Module)
            .map(|n| n.qualified_name.clone())
            .collect();
        assert_eq!(imports, ["os.path", "typing"].iter().map(|s| s.to_string()).collect());

        assert!(edges(&graph, EdgeKind::Extends).contains(&("pkg.users.UserService".into(), "pkg.users.Base".into())));
        assert!(edges(&graph, EdgeKind::Calls).contains(&(
            "pkg.users.UserService.load".into(),
            "pkg.users.UserService.fetch".into()
        )));
    }

    #[test]
    fn route_decorator_exposes_endpoint() {
        let graph = extract(
            "api.py",
            "@app.get(\"/users\")\ndef list_users():\n    return []\n\n@router.route('/login', methods=['post'])\ndef login():\n    return None\n",
        );
        let endpoint = node(&graph, "api.list_users.GET /users");
        assert_eq!(endpoint.kind, NodeKind::Endpoint);
        assert_eq!(endpoint.meta("route"), Some("/users"));
        assert_eq!(node(&graph, "api.login.POST /login").meta("httpMethod"), Some("POST"));
        assert_eq!(node(&graph, "api.list_users").meta("decorators"), Some("app.get"));
        assert!(edges(&graph, EdgeKind::ExposesEndpoint).contains(&(
            "api.list_users".into(),
            "api.list_users.GET /users".into()
        )));
    }

    #[test]
    fn elif_chain_and_call_sites() {
        let graph = extract(
            "m.py",
            "def helper():\n    pass\n\ndef f(x):\n    if x > 1:\n        helper()\n    elif x < 0:\n        return -1\n    else:\n        y = helper()\n    return x\n",
        );
        let branches: BTreeSet<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Branch)
            .map(|n| n.qualified_name.as_str())
            .collect();
        assert_eq!(
            branches,
            ["m.f::if#0", "m.f::elif#0", "m.f::call#0", "m.f::call#1", "m.f::return#0", "m.f::return#1"]
                .into_iter()
                .collect()
        );
        let elif = node(&graph, "m.f::elif#0");
        assert_eq!(elif.meta("snippet"), Some("elif x < 0:"));
        assert_eq!(elif.meta("owner"), Some("m.f"));

        let sites: Vec<_> = graph.edges.iter().filter(|e| e.is_call_site()).collect();
        assert_eq!(sites.len(), 2);
        assert!(sites.iter().all(|e| e.target.ends_with(":m.helper")));
    }

    #[test]
    fn nested_functions_are_qualified_under_parent() {
        let graph = extract("m.py", "def outer():\n    def inner():\n        return 1\n    return inner()\n");
        let inner = node(&graph, "m.outer.inner");
        assert_eq!(inner.kind, NodeKind::Function);
        assert!(edges(&graph, EdgeKind::Declares).contains(&("m.outer".into(), "m.outer.inner".into())));
        assert!(edges(&graph, EdgeKind::Calls).contains(&("m.outer".into(), "m.outer.inner".into())));
        // The nested def is opaque to the outer skeleton.
        assert!(graph.nodes.iter().any(|n| n.qualified_name == "m.outer.inner::return#0"));
        assert!(graph.nodes.iter().any(|n| n.qualified_name == "m.outer::return#0"));
    }
}
