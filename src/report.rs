//! report.rs
//!
//! End-of-run summary, one line per session.

use crate::session::{Phase, SessionOutcome};

pub fn summary_line(outcome: &SessionOutcome) -> String {
    let artifact = outcome
        .artifact
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} | attempts: {} | {} | {}",
        outcome.signature, outcome.attempts, outcome.phase, artifact
    )
}

/// Prints the per-function report and logs the failing diagnostics. Every
/// session shows up here with an explicit terminal status.
pub fn print_report(outcomes: &[SessionOutcome]) {
    println!("\n=== GENERATED TESTS ===");

    for outcome in outcomes {
        println!("{}", summary_line(outcome));

        if outcome.phase == Phase::Exhausted {
            tracing::warn!(
                signature = %outcome.signature,
                exit_code = outcome.result.exit_code,
                "last diagnostic:\n{}",
                outcome.result.diagnostic()
            );
        }
    }

    let succeeded = outcomes
        .iter()
        .filter(|o| o.phase == Phase::Succeeded)
        .count();
    println!("{} of {} functions have compiling tests", succeeded, outcomes.len());
}
