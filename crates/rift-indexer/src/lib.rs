//! Source analysis: tree-sitter parsing, symbol extraction and control-flow
//! skeletons, merged into one `SnapshotGraph` per snapshot

pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod flow;
pub mod languages;
pub mod parser;
pub mod signature;


pub use coordinator::Coordinator;
pub use error::AnalyzeError;
pub use extractor::{ExtractionResult, FileBuilder, LanguageExtractor, SnapshotMeta, SourceFile};
pub use parser::FileType;
