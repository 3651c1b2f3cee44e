//! Join barrier counting live client workers.

use std::sync::{Condvar, Mutex, PoisonError};

/// Counts active worker threads so `deinit` can wait for quiescence.
///
/// Workers call `enter` before their serving loop and `leave` after
/// their teardown completes; `wait_idle` blocks until the count drops
/// to zero.
#[derive(Debug, Default)]
pub(crate) struct WorkerGate {
    active: Mutex<usize>,
    idle: Condvar,
}

impl WorkerGate {
    pub(crate) fn enter(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active += 1;
    }

    pub(crate) fn leave(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.idle.notify_all();
        }
    }

    pub(crate) fn wait_idle(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        while *active > 0 {
            active = self
                .idle
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn enter_leave_balance() {
        let gate = WorkerGate::default();
        gate.enter();
        gate.enter();
        assert_eq!(gate.count(), 2);
        gate.leave();
        gate.leave();
        assert_eq!(gate.count(), 0);
    }

    #[test]
    fn wait_idle_returns_immediately_when_idle() {
        let gate = WorkerGate::default();
        gate.wait_idle();
    }

    #[test]
    fn wait_idle_blocks_until_workers_leave() {
        let gate = Arc::new(WorkerGate::default());
        gate.enter();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_idle())
        };

        // Give the waiter a moment to block, then release it.
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        gate.leave();
        waiter.join().unwrap();
    }
}
