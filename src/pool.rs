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

//! The shared pool of transaction processor slots.
//!
//! A transaction must hold one slot while it mutates a balance, modeling a
//! finite number of internal processing channels shared by every machine.

use crate::base::AccountNumber;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Fixed-size set of mutually exclusive processing slots.
///
/// Slots are plain non-reentrant locks, each independently acquirable with
/// a timeout. A slot is held by at most one transaction at a time, and no
/// transaction ever holds two.
///
/// The pool also keeps an audit side table counting how many times each
/// account has been touched by any transaction attempt. The count is bumped
/// before slot acquisition, so attempts that fail to get a slot still
/// register. It is never consulted for correctness.
#[derive(Debug)]
pub struct ProcessorPool {
    slots: Vec<Mutex<()>>,
    touches: DashMap<AccountNumber, u64>,
}

impl ProcessorPool {
    /// Default number of processing slots.
    pub const DEFAULT_SLOTS: usize = 2;

    /// Creates a pool with `slots` processing slots.
    ///
    /// # Panics
    ///
    /// Panics if `slots` is zero.
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "pool must have at least one slot");
        Self {
            slots: (0..slots).map(|_| Mutex::new(())).collect(),
            touches: DashMap::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Acquires any free slot, waiting up to `timeout` overall.
    ///
    /// Slots are scanned in a stable order: a fast uncontended pass first,
    /// then a bounded wait on each slot in turn against a single deadline,
    /// so a held slot does not starve the attempt on the next one. `None`
    /// is an expected outcome under load, not an error.
    pub fn acquire(&self, timeout: Duration) -> Option<ProcessorPermit<'_>> {
        for (slot, lock) in self.slots.iter().enumerate() {
            if let Some(guard) = lock.try_lock() {
                return Some(ProcessorPermit { slot, _guard: guard });
            }
        }

        let deadline = Instant::now() + timeout;
        for (slot, lock) in self.slots.iter().enumerate() {
            if let Some(guard) = lock.try_lock_until(deadline) {
                return Some(ProcessorPermit { slot, _guard: guard });
            }
        }
        None
    }

    /// Records a transaction attempt against `number`.
    pub fn record_touch(&self, number: &AccountNumber) {
        *self.touches.entry(number.clone()).or_insert(0) += 1;
    }

    /// Attempts recorded against `number`, failed ones included.
    pub fn touches(&self, number: &AccountNumber) -> u64 {
        self.touches.get(number).map(|count| *count).unwrap_or(0)
    }
}

impl Default for ProcessorPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SLOTS)
    }
}

/// RAII handle to an acquired processing slot.
///
/// Dropping the permit frees the slot, on every exit path, exactly once.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot"]
pub struct ProcessorPermit<'a> {
    slot: usize,
    _guard: MutexGuard<'a, ()>,
}

impl ProcessorPermit<'_> {
    /// Index of the held slot.
    pub fn slot(&self) -> usize {
        self.slot
    }
}
