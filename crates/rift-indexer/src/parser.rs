//! Tree-sitter grammar selection and parsing.
//!
//! `tree_sitter::Parser` is neither `Send` nor `Sync`, so every parse builds
//! its own parser. This keeps per-file analysis free of shared mutable state.

use std::path::Path;

use rift_core::Language;
use tree_sitter::{Parser, Tree};

use crate::error::AnalyzeError;

/// Supported file types for parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Python,
    TypeScript,
    Tsx,
    JavaScript,
}

impl FileType {
    /// Determine file type from file extension
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        Self::from_language(Language::from_path(path.as_ref()))
    }

    pub fn from_language(language: Language) -> Option<Self> {
        match language {
            Language::Python => Some(FileType::Python),
            Language::TypeScript => Some(FileType::TypeScript),
            Language::Tsx => Some(FileType::Tsx),
            Language::JavaScript => Some(FileType::JavaScript),
            Language::Unknown => None,
        }
    }

    pub fn language(self) -> Language {
        match self {
            FileType::Python => Language::Python,
            FileType::TypeScript => Language::TypeScript,
            FileType::Tsx => Language::Tsx,
            FileType::JavaScript => Language::JavaScript,
        }
    }

    /// Get the tree-sitter language for this file type
    pub fn grammar(self) -> tree_sitter::Language {
        match self {
            FileType::Python => tree_sitter_python::LANGUAGE.into(),
            FileType::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            FileType::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            FileType::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Parse `source` with a fresh parser for `file_type`.
pub fn parse(file_type: FileType, path: &str, source: &str) -> Result<Tree, AnalyzeError> {
    let mut parser = Parser::new();
    parser
        .set_language(&file_type.grammar())
        .map_err(|e| AnalyzeError::Grammar {
            language: file_type.language().as_str(),
            message: e.to_string(),
        })?;
    parser.parse(source, None).ok_or_else(|| AnalyzeError::ParseFailed {
        path: path.to_string(),
    })
}

/// First line (1-based) holding a syntax error, if the tree has one.
pub fn first_error_line(tree: &Tree) -> Option<u32> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row as u32 + 1);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    Some(root.start_position().row as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_file_types() {
        assert_eq!(FileType::from_path("pkg/mod.py"), Some(FileType::Python));
        assert_eq!(FileType::from_path("src/App.tsx"), Some(FileType::Tsx));
        assert_eq!(FileType::from_path("lib/util.mjs"), Some(FileType::JavaScript));
        assert_eq!(FileType::from_path("README.md"), None);
    }

    #[test]
    fn parses_each_grammar() {
        let cases = [
            (FileType::Python, "def f():\n    return 1\n", "module"),
            (FileType::TypeScript, "function f(): number { return 1; }", "program"),
            (FileType::Tsx, "const A = () => <div />;", "program"),
            (FileType::JavaScript, "function f() { return 1; }", "program"),
        ];
        for (file_type, source, root) in cases {
            let tree = parse(file_type, "x", source).unwrap();
            assert_eq!(tree.root_node().kind(), root);
            assert_eq!(first_error_line(&tree), None);
        }
    }

    #[test]
    fn reports_first_error_line() {
        let tree = parse(FileType::Python, "x.py", "def ok():\n    pass\n\ndef broken(:\n").unwrap();
        assert_eq!(first_error_line(&tree), Some(4));
    }
}
