//! Inter-thread handshakes for the four simulation units.
//!
//! `Latch` is the one-shot "I am initialized" flag the clock waits on before
//! the first pulse. `Signal` is a counting wakeup: a notification delivered
//! while nobody is waiting stays pending instead of being lost, which a bare
//! condvar signal would not guarantee.

use std::sync::{Condvar, Mutex};

/// One-shot boolean flag with blocking wait.
#[derive(Default)]
pub struct Latch {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Latch {
            set: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut set = self.set.lock().unwrap();
        *set = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut set = self.set.lock().unwrap();
        while !*set {
            set = self.cond.wait(set).unwrap();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.set.lock().unwrap()
    }
}

/// Counting notification. `notify` adds a permit and wakes one waiter;
/// `wait` blocks until a permit exists and consumes it.
#[derive(Default)]
pub struct Signal {
    pending: Mutex<usize>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Signal {
            pending: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending += 1;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut pending = self.pending.lock().unwrap();
        while *pending == 0 {
            pending = self.cond.wait(pending).unwrap();
        }
        *pending -= 1;
    }

    /// Consume a pending notification without blocking.
    pub fn try_wait(&self) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if *pending == 0 {
            return false;
        }
        *pending -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_latch_releases_waiter() {
        let latch = Arc::new(Latch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };
        thread::sleep(Duration::from_millis(10));
        assert!(!latch.is_set());
        latch.set();
        waiter.join().unwrap();
        assert!(latch.is_set());
    }

    #[test]
    fn test_latch_wait_after_set_returns_immediately() {
        let latch = Latch::new();
        latch.set();
        latch.wait();
    }

    #[test]
    fn test_signal_before_wait_is_not_lost() {
        let signal = Signal::new();
        signal.notify();
        signal.notify();
        assert!(signal.try_wait());
        assert!(signal.try_wait());
        assert!(!signal.try_wait());
    }

    #[test]
    fn test_signal_wakes_blocked_waiter() {
        let signal = Arc::new(Signal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait())
        };
        thread::sleep(Duration::from_millis(10));
        signal.notify();
        waiter.join().unwrap();
    }
}
