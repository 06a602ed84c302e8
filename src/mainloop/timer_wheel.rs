//! Production [`Clock`]: deadlines are real [`Instant`]s, and the mainloop
//! drives firing by calling [`TimerWheel::fire_due`] after every poll wakeup.

use std::time::{Duration, Instant};

use crate::timer::{Clock, TimerHandle};

struct PendingTimer {
    handle: TimerHandle,
    deadline: Instant,
    callback: Option<Box<dyn FnOnce()>>,
}

pub struct TimerWheel {
    next_id: u64,
    pending: Vec<PendingTimer>,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel { next_id: 0, pending: Vec::new() }
    }

    /// How long the mainloop's poll call should block for, or `None` if no
    /// timer is armed.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending
            .iter()
            .map(|t| t.deadline.saturating_duration_since(now))
            .min()
    }

    /// Invokes every callback whose deadline has passed.
    pub fn fire_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].deadline <= now {
                let mut timer = self.pending.remove(i);
                if let Some(cb) = timer.callback.take() {
                    cb();
                }
            } else {
                i += 1;
            }
        }
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimerWheel {
    fn arm(&mut self, duration: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(PendingTimer {
            handle,
            deadline: Instant::now() + duration,
            callback: Some(callback),
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|t| t.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_due_timers_and_keeps_future_ones() {
        let mut wheel = TimerWheel::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let a = log.clone();
        wheel.arm(Duration::from_millis(0), Box::new(move || a.borrow_mut().push("now")));
        let b = log.clone();
        wheel.arm(Duration::from_secs(3600), Box::new(move || b.borrow_mut().push("later")));

        wheel.fire_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec!["now"]);
        assert_eq!(wheel.pending.len(), 1);
    }

    #[test]
    fn cancel_prevents_fire() {
        let mut wheel = TimerWheel::new();
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handle = wheel.arm(Duration::from_millis(0), Box::new(move || *f.borrow_mut() = true));
        wheel.cancel(handle);
        wheel.fire_due(Instant::now() + Duration::from_secs(1));
        assert!(!*fired.borrow());
    }
}
