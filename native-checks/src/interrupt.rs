//! Shared interruption flag for workers and the supervisor.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative stop signal. Cloning shares the same flag.
///
/// Workers poll [`Interrupt::is_set`] between receives; the supervisor
/// sleeps in [`Interrupt::wait`] so `stop()` wakes it right away.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Raise the flag and wake everything blocked in [`Interrupt::wait`].
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.cvar.notify_all();
    }

    /// Block for up to `timeout`, returning early once interrupted.
    ///
    /// Returns whether the flag is set.
    /// A timeout too large to express as a deadline waits for the trigger.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.inner.lock.lock();
        while !self.is_set() {
            match deadline {
                Some(deadline) => {
                    if self.inner.cvar.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                None => self.inner.cvar.wait(&mut guard),
            }
        }
        self.is_set()
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt").field("set", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clones_share_flag() {
        let a = Interrupt::new();
        let b = a.clone();
        assert!(!b.is_set());
        a.trigger();
        assert!(b.is_set());
    }

    #[test]
    fn test_wait_times_out_when_not_triggered() {
        let interrupt = Interrupt::new();
        let start = Instant::now();
        assert!(!interrupt.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_trigger_wakes_waiter_early() {
        let interrupt = Interrupt::new();
        let waiter = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let woke = interrupt.wait(Duration::from_secs(10));
                (woke, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        interrupt.trigger();

        let (woke, elapsed) = waiter.join().unwrap();
        assert!(woke);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_for_trigger() {
        let interrupt = Interrupt::new();
        let waiter = {
            let interrupt = interrupt.clone();
            thread::spawn(move || interrupt.wait(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        interrupt.trigger();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_after_trigger_returns_immediately() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert!(interrupt.wait(Duration::from_secs(10)));
    }
}
