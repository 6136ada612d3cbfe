//! Control-flow skeleton construction shared by all languages.
//!
//! Extractors lower a function body into [`FlowStmt`]s; [`FlowBuilder`]
//! turns them into `Branch` nodes connected by flow edges. Each statement
//! yields an entry branch, the exits that continue to the next statement,
//! and whether control can fall through it.

use std::collections::{BTreeMap, HashMap};

use rift_core::FlowType;
use tree_sitter::Node;

use crate::extractor::{FileBuilder, Reference};
use crate::signature::{header_signature, line_span, snippet};

/// Display and matching content of one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSite {
    pub kind: &'static str,
    pub lines: (u32, u32),
    pub snippet: String,
    pub signature: String,
    pub callee: Option<String>,
}

impl BranchSite {
    /// Site for a statement, signed by its header (body excluded).
    pub fn from_node(kind: &'static str, node: Node<'_>, source: &str) -> Self {
        BranchSite {
            kind,
            lines: line_span(node),
            snippet: snippet(node, source),
            signature: header_signature(node, source),
            callee: None,
        }
    }

    pub fn with_snippet(mut self, snippet: &str) -> Self {
        self.snippet = snippet.to_string();
        self
    }

    pub fn with_callee(mut self, callee: impl Into<String>) -> Self {
        self.callee = Some(callee.into());
        self
    }
}

/// Language-neutral statement shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStmt {
    If {
        site: BranchSite,
        /// Statically known condition value, if any.
        truth: Option<bool>,
        then_body: Vec<FlowStmt>,
        else_body: Option<Vec<FlowStmt>>,
    },
    /// `return`, `raise`, `throw`.
    Exit(BranchSite),
    Call(BranchSite),
    Loop {
        site: BranchSite,
        body: Vec<FlowStmt>,
    },
    Try {
        site: BranchSite,
        body: Vec<FlowStmt>,
        handlers: Vec<Vec<FlowStmt>>,
        finally: Option<Vec<FlowStmt>>,
    },
    /// Context-scoped block such as `with`.
    Scoped {
        site: BranchSite,
        body: Vec<FlowStmt>,
    },
    /// A nested statement list with no branch of its own.
    Sequence(Vec<FlowStmt>),
    /// Anything without a branch: assignments, nested declarations.
    Opaque { falls: bool },
}

type Anchor = (String, FlowType);

struct Lowered {
    entry: Option<String>,
    exits: Vec<Anchor>,
    falls: bool,
}

fn falls_through(stmt: &FlowStmt) -> bool {
    match stmt {
        FlowStmt::Exit(_) => false,
        FlowStmt::If {
            then_body, else_body, ..
        } => block_falls_through(then_body) || else_body.as_deref().is_none_or(block_falls_through),
        FlowStmt::Try {
            body,
            handlers,
            finally,
            ..
        } => {
            let inner = block_falls_through(body) || handlers.iter().any(|h| block_falls_through(h));
            inner && finally.as_deref().is_none_or(block_falls_through)
        }
        FlowStmt::Scoped { body, .. } | FlowStmt::Sequence(body) => block_falls_through(body),
        FlowStmt::Loop { .. } | FlowStmt::Call(_) => true,
        FlowStmt::Opaque { falls } => *falls,
    }
}

fn block_falls_through(stmts: &[FlowStmt]) -> bool {
    stmts.iter().all(falls_through)
}

fn dedup(exits: Vec<Anchor>) -> Vec<Anchor> {
    let mut out: Vec<Anchor> = Vec::with_capacity(exits.len());
    for exit in exits {
        if !out.contains(&exit) {
            out.push(exit);
        }
    }
    out
}

/// Builds the skeleton of one callable into a [`FileBuilder`].
pub struct FlowBuilder<'b, 'a> {
    file: &'b mut FileBuilder<'a>,
    owner_id: String,
    owner_qualified: String,
    owner_scope: String,
    counters: HashMap<&'static str, u32>,
}

impl<'b, 'a> FlowBuilder<'b, 'a> {
    pub fn new(file: &'b mut FileBuilder<'a>, owner_id: &str, owner_qualified: &str) -> Self {
        let owner_scope = file
            .parent_of(owner_id)
            .unwrap_or_else(|| file.file_id())
            .to_string();
        FlowBuilder {
            file,
            owner_id: owner_id.to_string(),
            owner_qualified: owner_qualified.to_string(),
            owner_scope,
            counters: HashMap::new(),
        }
    }

    /// Lower a body and connect the owner to its entry with `next`.
    pub fn build(mut self, body: &[FlowStmt]) {
        let lowered = self.block(body);
        if let Some(entry) = lowered.entry {
            let owner = self.owner_id.clone();
            self.flow(&owner, &entry, FlowType::Next);
        }
    }

    fn flow(&mut self, source: &str, target: &str, flow: FlowType) {
        self.file
            .add_edge(rift_core::EdgeKind::Calls, source, target, Some(flow), false);
    }

    fn branch(&mut self, site: &BranchSite) -> String {
        let counter = self.counters.entry(site.kind).or_insert(0);
        let idx = *counter;
        *counter += 1;

        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), self.owner_qualified.clone());
        metadata.insert("branchType".to_string(), site.kind.to_string());
        metadata.insert("snippet".to_string(), site.snippet.clone());
        if let Some(callee) = &site.callee {
            metadata.insert("callee".to_string(), callee.clone());
        }
        let id = self.file.add_branch(
            format!("{}::{}#{}", self.owner_qualified, site.kind, idx),
            format!("{}#{}", site.kind, idx),
            site.lines,
            site.signature.clone(),
            metadata,
            &self.owner_id,
        );
        if let Some(callee) = &site.callee {
            self.file
                .refer_from_scope(Reference::CallSite, &id, &self.owner_scope, callee);
        }
        id
    }

    fn block(&mut self, stmts: &[FlowStmt]) -> Lowered {
        let mut entry: Option<String> = None;
        let mut pending: Vec<Anchor> = Vec::new();
        for stmt in stmts {
            let lowered = self.stmt(stmt);
            match lowered.entry {
                Some(stmt_entry) => {
                    for (source, flow) in &pending {
                        self.flow(source, &stmt_entry, *flow);
                    }
                    if entry.is_none() {
                        entry = Some(stmt_entry);
                    }
                    pending = lowered.exits;
                }
                None if !lowered.falls => pending.clear(),
                None => {}
            }
        }
        Lowered {
            entry,
            exits: pending,
            falls: block_falls_through(stmts),
        }
    }

    fn stmt(&mut self, stmt: &FlowStmt) -> Lowered {
        match stmt {
            FlowStmt::If {
                site,
                truth,
                then_body,
                else_body,
            } => self.conditional(site, *truth, then_body, else_body.as_deref()),
            FlowStmt::Exit(site) => Lowered {
                entry: Some(self.branch(site)),
                exits: Vec::new(),
                falls: false,
            },
            FlowStmt::Call(site) => {
                let id = self.branch(site);
                Lowered {
                    entry: Some(id.clone()),
                    exits: vec![(id, FlowType::Next)],
                    falls: true,
                }
            }
            FlowStmt::Loop { site, body } => {
                let id = self.branch(site);
                let inner = self.block(body);
                if let Some(entry) = &inner.entry {
                    self.flow(&id, entry, FlowType::True);
                }
                let mut exits = vec![(id.clone(), FlowType::Next)];
                exits.extend(inner.exits);
                Lowered {
                    entry: Some(id),
                    exits: dedup(exits),
                    falls: true,
                }
            }
            FlowStmt::Try {
                site,
                body,
                handlers,
                finally,
            } => self.guarded(site, body, handlers, finally.as_deref()),
            FlowStmt::Scoped { site, body } => {
                let id = self.branch(site);
                let inner = self.block(body);
                let exits = match &inner.entry {
                    Some(entry) => {
                        self.flow(&id, entry, FlowType::Next);
                        inner.exits
                    }
                    None if inner.falls => vec![(id.clone(), FlowType::Next)],
                    None => Vec::new(),
                };
                Lowered {
                    entry: Some(id),
                    exits,
                    falls: inner.falls,
                }
            }
            FlowStmt::Sequence(body) => self.block(body),
            FlowStmt::Opaque { falls } => Lowered {
                entry: None,
                exits: Vec::new(),
                falls: *falls,
            },
        }
    }

    fn conditional(
        &mut self,
        site: &BranchSite,
        truth: Option<bool>,
        then_body: &[FlowStmt],
        else_body: Option<&[FlowStmt]>,
    ) -> Lowered {
        let cond = self.branch(site);
        let then_reachable = truth != Some(false);
        let else_reachable = truth != Some(true);

        let then = self.block(then_body);
        let otherwise = match else_body {
            Some(body) => self.block(body),
            None => Lowered {
                entry: None,
                exits: Vec::new(),
                falls: true,
            },
        };

        if let (Some(entry), true) = (&then.entry, then_reachable) {
            self.flow(&cond, entry, FlowType::True);
        }
        if let (Some(entry), true) = (&otherwise.entry, else_reachable) {
            self.flow(&cond, entry, FlowType::False);
        }

        // Without an else, continuation is modeled from the condition itself:
        // `next` when the body can fall through, `false` when it is terminal.
        if else_body.is_none() {
            let flow = if then.falls { FlowType::Next } else { FlowType::False };
            return Lowered {
                entry: Some(cond.clone()),
                exits: vec![(cond, flow)],
                falls: true,
            };
        }

        let mut exits = Vec::new();
        if then_reachable {
            exits.extend(then.exits);
        }
        if else_reachable {
            exits.extend(otherwise.exits);
        }
        if then.entry.is_none() && then.falls && then_reachable {
            exits.push((cond.clone(), FlowType::True));
        }
        if otherwise.entry.is_none() && otherwise.falls && else_reachable {
            exits.push((cond.clone(), FlowType::False));
        }
        Lowered {
            entry: Some(cond),
            exits: dedup(exits),
            falls: (then_reachable && then.falls) || (else_reachable && otherwise.falls),
        }
    }

    fn guarded(
        &mut self,
        site: &BranchSite,
        body: &[FlowStmt],
        handlers: &[Vec<FlowStmt>],
        finally: Option<&[FlowStmt]>,
    ) -> Lowered {
        let id = self.branch(site);
        let inner = self.block(body);
        let mut exits = match &inner.entry {
            Some(entry) => {
                self.flow(&id, entry, FlowType::Next);
                inner.exits
            }
            None if inner.falls => vec![(id.clone(), FlowType::Next)],
            None => Vec::new(),
        };

        let mut any_handler_falls = false;
        for handler in handlers {
            let lowered = self.block(handler);
            any_handler_falls |= lowered.falls;
            match &lowered.entry {
                Some(entry) => {
                    self.flow(&id, entry, FlowType::False);
                    exits.extend(lowered.exits);
                }
                None if lowered.falls => exits.push((id.clone(), FlowType::False)),
                None => {}
            }
        }
        let mut falls = inner.falls || any_handler_falls;

        if let Some(finally) = finally {
            let tail = self.block(finally);
            if let Some(entry) = &tail.entry {
                for (source, flow) in &exits {
                    self.flow(source, entry, *flow);
                }
                exits = tail.exits;
            }
            falls = falls && tail.falls;
        }

        Lowered {
            entry: Some(id),
            exits: dedup(exits),
            falls,
        }
    }
}
