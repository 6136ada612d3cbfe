//! Textual hunks per file and unified-diff parsing

use std::sync::LazyLock;

use regex::Regex;
use rift_core::FileChangeStatus;
use serde::{Deserialize, Serialize};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("static regex")
});
static FILE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff --git a/(.+) b/(.+)$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// Body lines including their `+`, `-` or ` ` prefix.
    pub lines: Vec<String>,
}

impl Hunk {
    /// Added plus removed lines.
    pub fn churn(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.starts_with('+') || line.starts_with('-'))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHunks {
    pub path: String,
    pub status: FileChangeStatus,
    pub hunks: Vec<Hunk>,
}

impl FileHunks {
    pub fn new(path: impl Into<String>, status: FileChangeStatus) -> Self {
        Self {
            path: path.into(),
            status,
            hunks: Vec::new(),
        }
    }

    pub fn churn(&self) -> usize {
        self.hunks.iter().map(Hunk::churn).sum()
    }
}

/// Parse `git diff` output into per-file hunks. Lines outside any recognized
/// file section are ignored.
pub fn parse_unified_diff(text: &str) -> Vec<FileHunks> {
    let mut files: Vec<FileHunks> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = FILE_HEADER.captures(line) {
            files.push(FileHunks::new(&caps[2], FileChangeStatus::Modified));
            continue;
        }
        let Some(file) = files.last_mut() else {
            continue;
        };
        if let Some(caps) = HUNK_HEADER.captures(line) {
            let number = |i: usize, default: u32| {
                caps.get(i)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(default)
            };
            file.hunks.push(Hunk {
                old_start: number(1, 0),
                old_lines: number(2, 1),
                new_start: number(3, 0),
                new_lines: number(4, 1),
                lines: Vec::new(),
            });
            continue;
        }
        if let Some(hunk) = file.hunks.last_mut() {
            if line.starts_with(['+', '-', ' ']) || line.is_empty() {
                hunk.lines.push(line.to_string());
            }
            continue;
        }
        if line.starts_with("new file mode") {
            file.status = FileChangeStatus::Added;
        } else if line.starts_with("deleted file mode") {
            file.status = FileChangeStatus::Deleted;
        } else if line.starts_with("rename to ") || line.starts_with("rename from ") {
            file.status = FileChangeStatus::Renamed;
        } else if line.starts_with("new mode") || line.starts_with("old mode") {
            file.status = FileChangeStatus::TypeChanged;
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "\
diff --git a/src/app.py b/src/app.py
index 83db48f..bf269f4 100644
--- a/src/app.py
+++ b/src/app.py
@@ -1,4 +1,5 @@
 def f():
-    return g()
+    value = h()
+    return value
@@ -10 +11 @@ def other():
-    pass
+    return None
diff --git a/src/new.ts b/src/new.ts
new file mode 100644
--- /dev/null
+++ b/src/new.ts
@@ -0,0 +1,2 @@
+export const x = 1;
+export const y = 2;
diff --git a/old.py b/renamed.py
similarity index 100%
rename from old.py
rename to renamed.py
";

    #[test]
    fn parses_files_statuses_and_churn() {
        let files = parse_unified_diff(PATCH);
        let summary: Vec<(&str, FileChangeStatus, usize, usize)> = files
            .iter()
            .map(|f| (f.path.as_str(), f.status, f.hunks.len(), f.churn()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("src/app.py", FileChangeStatus::Modified, 2, 5),
                ("src/new.ts", FileChangeStatus::Added, 1, 2),
                ("renamed.py", FileChangeStatus::Renamed, 0, 0),
            ]
        );
        let second = &files[0].hunks[1];
        assert_eq!((second.old_start, second.old_lines, second.new_start, second.new_lines), (10, 1, 11, 1));
    }
}
