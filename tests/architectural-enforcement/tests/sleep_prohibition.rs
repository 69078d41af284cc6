//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Every delay (handshake
//! timeout, reconnect backoff) is a `ScheduledTask` that the connection
//! driver owns and can cancel.
//! **Exception**: `chatlink/core/src/connection/timer.rs`, which implements
//! `ScheduledTask`. Test code is never scanned.

use architectural_enforcement::{production_lines, relative};

/// The only file allowed to sleep
const TIMER_MODULE: &str = "chatlink/core/src/connection/timer.rs";

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use ScheduledTask::after() so the delay can be cancelled.");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The timer module really is where delays come from
#[test]
fn test_timer_module_sleeps() {
    let sleeps = production_lines("chatlink/core/src/connection")
        .into_iter()
        .filter(|l| relative(&l.path) == TIMER_MODULE && is_sleep(&l.code))
        .count();
    assert_eq!(sleeps, 1, "expected exactly one sleep in {TIMER_MODULE}");
}

fn find_sleep_violations() -> Vec<String> {
    ["chatlink/core/src", "chatlink/cli/src"]
        .into_iter()
        .flat_map(production_lines)
        .filter(|l| is_sleep(&l.code) && relative(&l.path) != TIMER_MODULE)
        .map(|l| format!("{}:{} - {}", relative(&l.path), l.number, l.code))
        .collect()
}

fn is_sleep(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep("tokio::time::sleep(delay).await;"));
        assert!(is_sleep("std::thread::sleep(Duration::from_millis(10));"));
        assert!(!is_sleep("let asleep = false;"));
    }
}
