//! Interrupt handling: a user signal during a running turn sets a flag the
//! turn loop checks between tool-loop iterations and, once observed,
//! injects a synthetic user message onto the session so the next LLM call
//! sees it without losing whatever work the current iteration already
//! produced.
//!
//! No raw-TTY/crossterm dependency here (terminal rendering is out of
//! scope) — `Ctrl-C` via `tokio::signal` is the interrupt source a
//! headless agent loop can actually observe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared between the task that watches for the interrupt signal and the
/// turn loop that polls it. Cheap to clone; every clone observes the same
/// flag.
#[derive(Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawns a background task that sets `flag` every time `Ctrl-C` is
/// received, for as long as the returned handle is kept alive. Dropping the
/// handle does not stop the watch (the process exits on repeated Ctrl-C
/// regardless), it only stops the caller from needing to hold a `JoinHandle`.
pub fn watch_ctrl_c(flag: InterruptFlag) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            flag.set();
        }
    });
}

/// The synthetic user message injected into history once an interrupt is
/// observed between tool-loop iterations.
pub fn interrupt_message() -> agentrt_domain::conversation::Message {
    agentrt_domain::conversation::Message::user(
        "[The user pressed Ctrl-C to interrupt the previous turn. Stop what you were doing and wait for further instructions.]",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_flag_and_reports_prior_state() {
        let flag = InterruptFlag::new();
        assert!(!flag.take());
        flag.set();
        assert!(flag.is_set());
        assert!(flag.take());
        assert!(!flag.is_set());
    }
}
