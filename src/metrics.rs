use std::time::Instant;

use tracing::info;

/// Wall-clock timer for a named operation.
///
/// Create one at the start of the operation and call [`finish`] with an
/// outcome label on every exit path (success, error, early return).
/// Finishing consumes the timer; a timer that is dropped without
/// finishing records nothing.
///
/// [`finish`]: ScopedTimer::finish
#[must_use]
pub struct ScopedTimer {
    operation: &'static str,
    started: Instant,
}

impl ScopedTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn finish(self, outcome: &str) {
        info!(
            target: "metrics",
            operation = self.operation,
            outcome,
            duration_ms = self.elapsed_ms(),
            "Operation finished"
        );
    }
}
