//! Language extractors for the supported grammars

pub mod python;
pub mod typescript;

use crate::extractor::LanguageExtractor;
use crate::parser::FileType;

/// Get the extractor for a file type. TypeScript, TSX and JavaScript share one.
pub fn extractor_for(file_type: FileType) -> &'static dyn LanguageExtractor {
    match file_type {
        FileType::Python => &python::PythonExtractor,
        FileType::TypeScript | FileType::Tsx | FileType::JavaScript => &typescript::TypeScriptExtractor,
    }
}
