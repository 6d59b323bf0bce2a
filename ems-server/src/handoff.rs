//! Bounded queue handing accepted connections from the admission loop to the workers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ems_utils::ipc::ConnectRequest;

pub struct SessionQueue {
    pending: Mutex<VecDeque<ConnectRequest>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl SessionQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SessionQueue {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a connection, waiting up to `timeout` for room. The connection is handed back if
    /// the queue is still full by then.
    pub fn push_timeout(
        &self,
        request: ConnectRequest,
        timeout: Duration,
    ) -> Result<(), ConnectRequest> {
        let deadline = Instant::now() + timeout;
        let mut pending = self.lock();
        while pending.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(request);
            }
            pending = self
                .not_full
                .wait_timeout(pending, deadline - now)
                .map(|(pending, _)| pending)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        pending.push_back(request);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest connection, blocking while the queue is empty.
    pub fn pop(&self) -> ConnectRequest {
        let mut pending = self.lock();
        loop {
            if let Some(request) = pending.pop_front() {
                self.not_full.notify_one();
                return request;
            }
            pending = self
                .not_empty
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    // a panicking worker never leaves the deque half-updated, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, VecDeque<ConnectRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "./unit/handoff_tests.rs"]
mod handoff_tests;
