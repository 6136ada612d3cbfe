use thiserror::Error;

/// Why a single file could not be analyzed. Always recovered per file by the
/// coordinator, which degrades the file to a bare `File` node.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{path}: unsupported file type")]
    Unsupported { path: String },

    #[error("{path}: content is not valid UTF-8")]
    InvalidUtf8 {
        path: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("{path}: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("failed to load {language} grammar: {message}")]
    Grammar { language: &'static str, message: String },

    #[error("{path}: parser produced no tree")]
    ParseFailed { path: String },

    #[error("{path}:{line}: syntax error")]
    Syntax { path: String, line: u32 },

    #[error("failed to build analysis thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
