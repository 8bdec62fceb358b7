//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the client core and the terminal surface
//! MUST NOT call sleep methods. Transient statuses carry a revert deadline,
//! polling uses `tokio::time::interval`.
//! **Exceptions**: test modules.

use architectural_enforcement::{scan_directory, workspace_root, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let root = workspace_root();
    let mut violations = Vec::new();
    let mut scanned = 0;

    for dir in PRODUCTION_DIRS {
        if let Some(found) = scan_directory(&root.join(dir)) {
            scanned += 1;
            violations.extend(found);
        }
    }

    assert!(scanned > 0, "no production sources found under {}", root.display());

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Instead:");
        eprintln!("  - Periodic tasks use tokio::time::interval()");
        eprintln!("  - Transient statuses carry a deadline (revert_after)");
        eprintln!("  - Waiting on events uses channels or async I/O");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
