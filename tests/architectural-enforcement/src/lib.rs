//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code: transient UI state carries a
//!   deadline, periodic work uses `tokio::time::interval`
//! - Test modules may do as they please
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by the enforcement tests
pub const PRODUCTION_DIRS: &[&str] = &["parley/core/src", "parley/cli/src"];

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// A forbidden call found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the call
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Whether a line of code calls a sleep function
///
/// Comments are ignored.
#[must_use]
pub fn calls_sleep(line: &str) -> bool {
    let code = line.split("//").next().unwrap_or(line);
    code.contains("::sleep(")
        || code.contains(".sleep(")
        || code.contains("sleep_until(")
        || code.contains("sleep_ms(")
}

/// Find sleep calls in one file's source, skipping everything from the first
/// `#[cfg(test)]` onwards
#[must_use]
pub fn scan_source(path: &Path, content: &str) -> Vec<Violation> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| calls_sleep(line))
        .map(|(idx, line)| Violation {
            path: path.to_path_buf(),
            line: idx + 1,
            text: line.trim().to_string(),
        })
        .collect()
}

/// Find sleep calls in every `.rs` file under `dir`
///
/// Returns `None` when the directory does not exist.
#[must_use]
pub fn scan_directory(dir: &Path) -> Option<Vec<Violation>> {
    if !dir.exists() {
        return None;
    }

    let mut violations = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        violations.extend(scan_source(entry.path(), &content));
    }
    Some(violations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_sleep_calls() {
        assert!(calls_sleep("tokio::time::sleep(Duration::from_secs(3)).await;"));
        assert!(calls_sleep("std::thread::sleep(d);"));
        assert!(calls_sleep("time::sleep_until(deadline).await;"));
        assert!(!calls_sleep("// no tokio::time::sleep( here"));
        assert!(!calls_sleep("tokio::time::timeout_at(deadline, rx.recv())"));
    }

    #[test]
    fn test_test_modules_are_skipped() {
        let source = "fn run() {}\n#[cfg(test)]\nmod tests {\n    fn t() { std::thread::sleep(d); }\n}\n";
        assert!(scan_source(Path::new("x.rs"), source).is_empty());

        let source = "fn run() {\n    std::thread::sleep(d);\n}\n";
        let violations = scan_source(Path::new("x.rs"), source);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 2);
    }
}
