//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code MUST NOT do blocking file, socket or process
//! I/O. Streams and the session store run on Tokio workers.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::process`, async `reqwest`
//! **Exceptions**: test code; configuration loading, which runs once before
//! any stream starts

use std::path::Path;

use architectural_enforcement::{find_patterns, production_lines, CodeLine};

const BLOCKING_IO_PATTERNS: &[&str] = &[
    "std::fs::",
    "use std::fs",
    "std::net::",
    "use std::net",
    "std::process::Command",
    "reqwest::blocking",
];

const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/cli/src"];

/// Files allowed to read from disk synchronously
const STARTUP_ONLY: &[&str] = &["relay/core/src/config.rs"];

fn is_startup_only(line: &CodeLine) -> bool {
    STARTUP_ONLY
        .iter()
        .any(|allowed| line.path.ends_with(Path::new(allowed)))
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<_> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| find_patterns(&production_lines(dir), BLOCKING_IO_PATTERNS))
        .filter(|line| !is_startup_only(line))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - std::fs::read_to_string(), std::fs::write(), std::fs::rename()");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ Instead:");
        eprintln!("  - tokio::fs::read_to_string().await, tokio::fs::write().await");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - tokio::process::Command::output().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_session_store_uses_async_fs() {
    let lines = production_lines("relay/core/src");
    let session: Vec<_> = lines
        .iter()
        .filter(|line| line.path.ends_with("session.rs"))
        .cloned()
        .collect();

    assert!(
        !find_patterns(&session, &["tokio::fs::write"]).is_empty(),
        "session store should persist with tokio::fs"
    );
    assert!(find_patterns(&session, BLOCKING_IO_PATTERNS).is_empty());
}
