use log::warn;

use crate::constants::MAX_TIMERS;

struct TimerEntry {
    target_pulses: u32,
    pulse_counter: u32,
    callback: Box<dyn FnMut() + Send>,
}

/// Derives lower-frequency periodic events from the master clock by pulse
/// counting, so one timing source serves every event type. Holds at most
/// `MAX_TIMERS` entries; registrations past that are dropped with a warning
/// rather than failing the simulation.
pub struct TimerSet {
    clock_rate: u32,
    timers: Vec<TimerEntry>,
}

impl TimerSet {
    pub fn new(clock_rate: u32) -> Self {
        TimerSet {
            clock_rate,
            timers: Vec::with_capacity(MAX_TIMERS),
        }
    }

    /// Register a periodic callback at `rate_hz`. A rate above the clock
    /// rate clamps to firing on every pulse.
    pub fn register<F>(&mut self, rate_hz: u32, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.timers.len() == MAX_TIMERS {
            warn!("timer: no timer slot available, {}Hz request dropped", rate_hz);
            return;
        }
        let target_pulses = (self.clock_rate / rate_hz).max(1);
        self.timers.push(TimerEntry {
            target_pulses,
            pulse_counter: 0,
            callback: Box::new(callback),
        });
    }

    /// Advance every entry by one master pulse; entries reaching their
    /// target reset and fire.
    pub fn pulse(&mut self) {
        for timer in &mut self.timers {
            timer.pulse_counter += 1;
            if timer.pulse_counter == timer.target_pulses {
                timer.pulse_counter = 0;
                (timer.callback)();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_timer(set: &mut TimerSet, rate_hz: u32) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        set.register(rate_hz, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_fires_at_derived_frequency() {
        let mut set = TimerSet::new(1000);
        let fired = counting_timer(&mut set, 100); // every 10 pulses

        for _ in 0..9 {
            set.pulse();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        set.pulse();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        for _ in 0..25 {
            set.pulse();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rate_above_clock_fires_every_pulse() {
        let mut set = TimerSet::new(10);
        let fired = counting_timer(&mut set, 1000);
        for _ in 0..5 {
            set.pulse();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_independent_counters() {
        let mut set = TimerSet::new(100);
        let fast = counting_timer(&mut set, 50); // every 2 pulses
        let slow = counting_timer(&mut set, 20); // every 5 pulses
        for _ in 0..10 {
            set.pulse();
        }
        assert_eq!(fast.load(Ordering::SeqCst), 5);
        assert_eq!(slow.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capacity_overflow_is_dropped_not_fatal() {
        let mut set = TimerSet::new(1000);
        for _ in 0..MAX_TIMERS {
            set.register(10, || {});
        }
        assert_eq!(set.len(), MAX_TIMERS);
        let dropped = counting_timer(&mut set, 1000);
        assert_eq!(set.len(), MAX_TIMERS);
        set.pulse();
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }
}
