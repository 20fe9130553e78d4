//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Streams wait on the
//! connection, on channels, or on `tokio::time::timeout`; nothing polls.
//! **Exceptions**: test code

use architectural_enforcement::{find_patterns, production_lines};

const SLEEP_PATTERNS: &[&str] = &["::sleep(", ".sleep(", "sleep_until("];

const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/cli/src"];

#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<_> = PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| find_patterns(&production_lines(dir), SLEEP_PATTERNS))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Instead:");
        eprintln!("  - await the connection or channel that delivers the event");
        eprintln!("  - bound waits with tokio::time::timeout");
        eprintln!("  - wake waiters with tokio::sync::Notify or watch");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
