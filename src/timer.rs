//! Abstract one-shot timer, consumed by the reactor and implemented
//! concretely by `mainloop::MioMainloop` (production) or [`VirtualClock`]
//! (tests). See `SPEC_FULL.md` §9.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Opaque handle to an armed timer. Cancelling a handle twice, or after it
/// has already fired, is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub(crate) u64);

/// A source of one-shot timers.
///
/// `arm` schedules `callback` to run after `duration` elapses, unless
/// cancelled first via the returned handle. Implementations must guarantee
/// that cancelling a timer whose deadline has already passed, but whose
/// callback has not yet been invoked, prevents that invocation.
pub trait Clock {
    fn arm(&mut self, duration: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;
    fn cancel(&mut self, handle: TimerHandle);
}

/// A deterministic [`Clock`] for tests: time only advances when
/// [`VirtualClock::advance`] is called, and timers fire in deadline order.
#[derive(Default)]
pub struct VirtualClock {
    now: Duration,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

struct PendingTimer {
    handle: TimerHandle,
    deadline: Duration,
    callback: Option<Box<dyn FnOnce()>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock {
            now: Duration::ZERO,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Advances time by `step`, firing (in deadline order) every timer whose
    /// deadline has been reached and was not cancelled in the meantime.
    pub fn advance(&mut self, step: Duration) {
        self.now += step;
        self.pending.sort_by_key(|t| t.deadline);

        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].deadline <= self.now {
                let mut timer = self.pending.remove(i);
                if let Some(cb) = timer.callback.take() {
                    cb();
                }
            } else {
                i += 1;
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Clock for VirtualClock {
    fn arm(&mut self, duration: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(PendingTimer {
            handle,
            deadline: self.now + duration,
            callback: Some(callback),
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|t| t.handle != handle);
    }
}

/// Shares one [`Clock`] between several owners via `Rc<RefCell<_>>`, so a
/// test can hold its own handle to a [`VirtualClock`] while the reactor holds
/// a type-erased `Box<dyn Clock>`.
pub struct SharedClock<C: Clock>(pub Rc<RefCell<C>>);

impl<C: Clock> Clock for SharedClock<C> {
    fn arm(&mut self, duration: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        self.0.borrow_mut().arm(duration, callback)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.0.borrow_mut().cancel(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_in_deadline_order() {
        let mut clock = VirtualClock::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let a = log.clone();
        clock.arm(Duration::from_secs(2), Box::new(move || a.borrow_mut().push("two")));
        let b = log.clone();
        clock.arm(Duration::from_secs(1), Box::new(move || b.borrow_mut().push("one")));

        clock.advance(Duration::from_secs(3));
        assert_eq!(*log.borrow(), vec!["one", "two"]);
    }

    #[test]
    fn cancel_prevents_fire() {
        let mut clock = VirtualClock::new();
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handle = clock.arm(Duration::from_secs(1), Box::new(move || *f.borrow_mut() = true));
        clock.cancel(handle);
        clock.advance(Duration::from_secs(2));
        assert!(!*fired.borrow());
    }
}
