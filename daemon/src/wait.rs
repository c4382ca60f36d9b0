//! Polling waits shared by every blocking command and loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Poll `predicate` every `poll` until it holds or `timeout` elapses.
///
/// The predicate is checked before the first sleep, so a condition that
/// already holds returns immediately. Returns true if the condition was met.
/// With no timeout the wait is unbounded.
pub fn await_condition(
    mut predicate: impl FnMut() -> bool,
    poll: Duration,
    timeout: Option<Duration>,
) -> bool {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if predicate() {
            return true;
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                poll.min(deadline - now)
            }
            None => poll,
        };
        thread::sleep(pause);
    }
}

/// Sleep for `duration`, waking early if `running` is cleared.
///
/// Returns false if the sleep was cut short.
pub fn sleep_while(running: &AtomicBool, duration: Duration) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    !await_condition(|| !running.load(Ordering::SeqCst), SLICE, Some(duration))
}
