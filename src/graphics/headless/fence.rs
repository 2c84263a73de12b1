use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

#[derive(Clone, Debug, Default)]
pub struct HeadlessFence(Arc<HeadlessFenceInner>);

#[derive(Debug, Default)]
pub struct HeadlessFenceInner {
    completed: Mutex<u64>,
    cond: Condvar,
}

impl HeadlessFence {
    pub(super) fn inner_new(initial_value: u64) -> Self {
        Self(Arc::new(HeadlessFenceInner {
            completed: Mutex::new(initial_value),
            cond: Condvar::new(),
        }))
    }

    pub fn completed_value(&self) -> u64 {
        *self.0.completed.lock()
    }

    /// GPU side of a signal. Values never move backwards.
    pub(super) fn complete(&self, value: u64) {
        let mut completed = self.0.completed.lock();
        if value > *completed {
            *completed = value;
            self.0.cond.notify_all();
        }
    }

    pub(super) fn wait(&self, value: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completed = self.0.completed.lock();

        while *completed < value {
            match deadline {
                Some(deadline) => {
                    if self.0.cond.wait_until(&mut completed, deadline).timed_out() {
                        return *completed >= value;
                    }
                }
                None => self.0.cond.wait(&mut completed),
            }
        }

        true
    }
}
