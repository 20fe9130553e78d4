//! Integration Test: Library Output Prohibition
//!
//! **Policy**: `relay-core` MUST NOT write to stdout or stderr. The CLI owns
//! both streams: stdout carries NDJSON chunks, stderr carries logs. The
//! library reports through `tracing` only.
//! **Exceptions**: test code, the CLI binary

use architectural_enforcement::{find_patterns, production_lines};

const OUTPUT_PATTERNS: &[&str] = &[
    "println!",
    "print!",
    "eprintln!",
    "eprint!",
    "dbg!",
    "std::io::stdout",
    "std::io::stderr",
    "io::stdout()",
    "io::stderr()",
];

#[test]
fn test_no_direct_output_in_core() {
    let violations = find_patterns(&production_lines("relay/core/src"), OUTPUT_PATTERNS);

    if !violations.is_empty() {
        eprintln!("\n❌ Direct output found in relay-core!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tracing::{{trace, debug, info, warn, error}} instead.");

        panic!(
            "\nFound {} output violation(s) in relay-core.",
            violations.len()
        );
    }
}

#[test]
fn test_no_panicking_shortcuts_in_core() {
    let violations = find_patterns(
        &production_lines("relay/core/src"),
        &[".unwrap()", ".expect(", "panic!(", "todo!(", "unimplemented!("],
    );

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        panic!(
            "\nFound {} panicking call(s) in relay-core production code.",
            violations.len()
        );
    }
}
