// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Admission control for concurrent sessions.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counting semaphore bounding how many sessions run at once.
///
/// Models the number of physical machines available to customers,
/// independent of the processor slots used for the actual mutation.
/// [`acquire`](ConcurrencyGate::acquire) blocks without bound — callers
/// queue rather than fail fast; callers that need a liveness bound use
/// [`try_acquire_for`](ConcurrencyGate::try_acquire_for).
#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    permits: Mutex<usize>,
    released: Condvar,
}

impl ConcurrencyGate {
    /// Default number of concurrently admitted sessions.
    pub const DEFAULT_CAPACITY: usize = 2;

    /// Creates a gate admitting up to `capacity` sessions at once.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "gate must admit at least one session");
        Self {
            capacity,
            permits: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    /// Takes one permit, blocking until one is free.
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.released.wait(&mut permits);
        }
        *permits -= 1;
        GatePermit { gate: self }
    }

    /// Takes one permit, waiting at most `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<GatePermit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.released.wait_until(&mut permits, deadline).timed_out() {
                return None;
            }
        }
        *permits -= 1;
        Some(GatePermit { gate: self })
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// RAII admission permit; returned to the gate on drop, including unwind.
#[derive(Debug)]
#[must_use = "dropping the permit releases the admission slot"]
pub struct GatePermit<'a> {
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut permits = self.gate.permits.lock();
        *permits += 1;
        self.gate.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn capacity_permits_are_countable() {
        let gate = ConcurrencyGate::new(2);
        assert_eq!(gate.capacity(), 2);
        assert_eq!(gate.available(), 2);

        let first = gate.acquire();
        assert_eq!(gate.available(), 1);
        let second = gate.acquire();
        assert_eq!(gate.available(), 0);

        drop(first);
        assert_eq!(gate.available(), 1);
        drop(second);
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn try_acquire_times_out_on_full_gate() {
        let gate = ConcurrencyGate::new(1);
        let _held = gate.acquire();

        let started = Instant::now();
        let attempt = gate.try_acquire_for(Duration::from_millis(50));
        assert!(attempt.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn blocked_acquire_proceeds_after_release() {
        let gate = Arc::new(ConcurrencyGate::new(1));
        let held = gate.acquire();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _permit = gate.acquire();
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);
        waiter.join().expect("waiter panicked");
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn never_admits_more_than_capacity() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = gate.acquire();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[test]
    #[should_panic(expected = "at least one session")]
    fn zero_capacity_is_rejected() {
        let _ = ConcurrencyGate::new(0);
    }
}
