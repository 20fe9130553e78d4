//! Architectural Enforcement Helpers
//!
//! Source scanning shared by the enforcement tests in `tests/`. The tests
//! check principles the compiler cannot:
//! - No sleeping in production code (wait on I/O, channels or timers)
//! - No stdout/stderr printing from the library (use `tracing`)
//! - No blocking file, socket or process I/O (use `tokio`)
//!
//! Only production code is scanned: comments, string literals and items
//! under `#[cfg(test)]` are ignored.

use std::fs;
use std::path::{Path, PathBuf};

/// One line of production code
#[derive(Debug, Clone)]
pub struct CodeLine {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The line with comments and string contents removed
    pub code: String,
    /// The original line
    pub source: String,
}

impl std::fmt::Display for CodeLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}",
            self.path.display(),
            self.number,
            self.source.trim()
        )
    }
}

/// Workspace root, from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every production line of every `.rs` file under `dir` (workspace-relative)
///
/// Panics if `dir` does not exist, so a moved crate cannot silently pass.
#[must_use]
pub fn production_lines(dir: &str) -> Vec<CodeLine> {
    let root = workspace_root().join(dir);
    assert!(root.is_dir(), "{} does not exist", root.display());

    let mut lines = Vec::new();
    for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
    {
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        lines.extend(scan_source(entry.path(), &content));
    }
    lines
}

/// Production lines of one file
#[must_use]
pub fn scan_source(path: &Path, content: &str) -> Vec<CodeLine> {
    let mut out = Vec::new();
    let mut scanner = Scanner::default();
    // Brace depth of the `#[cfg(test)]` item being skipped
    let mut skip_depth: Option<i64> = None;
    let mut pending_test_item = false;

    for (idx, source) in content.lines().enumerate() {
        let code = scanner.strip(source);
        let opens = code.matches('{').count() as i64;
        let closes = code.matches('}').count() as i64;

        if let Some(depth) = skip_depth.as_mut() {
            *depth += opens - closes;
            if *depth <= 0 {
                skip_depth = None;
            }
            continue;
        }

        let trimmed = code.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            pending_test_item = true;
            continue;
        }
        if pending_test_item {
            if opens > closes {
                skip_depth = Some(opens - closes);
                pending_test_item = false;
            } else if trimmed.ends_with(';') || (opens > 0 && opens == closes) {
                pending_test_item = false;
            }
            continue;
        }

        out.push(CodeLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            source: source.to_string(),
        });
    }
    out
}

/// Lines whose code contains any of `patterns`
#[must_use]
pub fn find_patterns(lines: &[CodeLine], patterns: &[&str]) -> Vec<CodeLine> {
    lines
        .iter()
        .filter(|l| patterns.iter().any(|p| l.code.contains(p)))
        .cloned()
        .collect()
}

#[derive(Default)]
enum State {
    #[default]
    Code,
    Str,
    /// Raw string closed by `"` followed by this many `#`
    RawStr(usize),
    BlockComment,
}

/// Removes comments and string contents, tracking state across lines
#[derive(Default)]
struct Scanner {
    state: State,
}

impl Scanner {
    fn strip(&mut self, line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match self.state {
                State::Code => {
                    if c == '/' && next == Some('/') {
                        break;
                    } else if c == '/' && next == Some('*') {
                        self.state = State::BlockComment;
                        i += 1;
                    } else if c == '"' {
                        out.push('"');
                        self.state = State::Str;
                    } else if c == 'r' && (next == Some('"') || next == Some('#')) {
                        let hashes = chars[i + 1..].iter().take_while(|&&h| h == '#').count();
                        if chars.get(i + 1 + hashes) == Some(&'"') {
                            out.push('"');
                            self.state = State::RawStr(hashes);
                            i += hashes + 1;
                        } else {
                            out.push(c);
                        }
                    } else if c == '\'' && chars.get(i + 2) == Some(&'\'') {
                        // char literal such as '{'
                        out.push_str("' '");
                        i += 2;
                    } else {
                        out.push(c);
                    }
                }
                State::Str => {
                    if c == '\\' {
                        i += 1;
                    } else if c == '"' {
                        out.push('"');
                        self.state = State::Code;
                    }
                }
                State::RawStr(hashes) => {
                    if c == '"' && chars[i + 1..].iter().take_while(|&&h| h == '#').count() >= hashes
                    {
                        out.push('"');
                        self.state = State::Code;
                        i += hashes;
                    }
                }
                State::BlockComment => {
                    if c == '*' && next == Some('/') {
                        self.state = State::Code;
                        i += 1;
                    }
                }
            }
            i += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(src: &str) -> Vec<String> {
        scan_source(Path::new("x.rs"), src)
            .into_iter()
            .map(|l| l.code)
            .collect()
    }

    #[test]
    fn test_strips_comments_and_strings() {
        let lines = code("let a = \"println!(x)\"; // println!\nlet b = r#\"{\"a\":1\"#;");
        assert_eq!(lines, vec!["let a = \"\"; ", "let b = \"\";"]);
    }

    #[test]
    fn test_skips_cfg_test_module() {
        let src = "fn real() {}\n#[cfg(test)]\nmod tests {\n    fn t() { let s = \"}\"; }\n}\nfn after() {}";
        assert_eq!(code(src), vec!["fn real() {}", "fn after() {}"]);
    }

    #[test]
    fn test_skips_cfg_test_single_item() {
        let src = "#[cfg(test)]\nuse std::thread::sleep;\nfn kept() {}";
        assert_eq!(code(src), vec!["fn kept() {}"]);
    }

    #[test]
    fn test_find_patterns() {
        let lines = scan_source(Path::new("x.rs"), "fn f() {\n    std::thread::sleep(d);\n}");
        let hits = find_patterns(&lines, &["::sleep("]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number, 2);
    }
}
