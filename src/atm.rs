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

//! Transaction machine front-end.
//!
//! A machine performs deposits and withdrawals against shared accounts.
//! Every machine holds the same processor pool and the same balance guard:
//! the account is a single source of truth regardless of which physical
//! machine touches it.
//!
//! # Acquisition order
//!
//! Every transaction path acquires in the same fixed order — processor
//! slot, then balance guard — so the two resource classes can never form a
//! circular wait. No path acquires two slots.

use crate::account::{Account, BalanceGuard};
use crate::base::AtmId;
use crate::pool::ProcessorPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One physical transaction machine.
///
/// Stateless beyond its label; all mutable state lives in [`Account`] and
/// the shared [`ProcessorPool`].
#[derive(Debug, Clone)]
pub struct Atm {
    id: AtmId,
    pool: Arc<ProcessorPool>,
    guard: BalanceGuard,
}

impl Atm {
    /// Default bound on waiting for a processor slot.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

    /// Creates a machine over the shared pool and guard.
    ///
    /// `guard` must be the guard held by every account this machine will
    /// operate on; clone one [`BalanceGuard`] into both.
    pub fn new(id: AtmId, pool: Arc<ProcessorPool>, guard: BalanceGuard) -> Self {
        Self { id, pool, guard }
    }

    pub fn id(&self) -> AtmId {
        self.id
    }

    /// Credits `amount` to `account`.
    ///
    /// Returns `false` when the amount is not positive or when no
    /// processor slot frees up within `timeout`; no state changes in
    /// either case. The pool's touch table is updated regardless of
    /// outcome.
    pub fn deposit(&self, account: &Account, amount: i64, timeout: Duration) -> bool {
        debug_assert!(self.guard.shares_lock_with(account.guard()));
        self.pool.record_touch(account.number());

        if amount <= 0 {
            return false;
        }
        let Some(permit) = self.pool.acquire(timeout) else {
            debug!(atm = %self.id, account = %account.number(), "no processor slot free");
            return false;
        };

        let held = self.guard.lock();
        // Validated again under the guard so the check and the mutation
        // form one atomic step.
        let success = if amount > 0 {
            let balance = account.balance();
            account.set_balance(balance + amount).is_ok()
        } else {
            false
        };
        drop(held);
        drop(permit);
        success
    }

    /// Debits `amount` from `account`.
    ///
    /// Returns `false` when the amount is not positive, no slot frees up
    /// within `timeout`, or the balance does not cover the amount; the
    /// balance is untouched in every failure case.
    pub fn withdraw(&self, account: &Account, amount: i64, timeout: Duration) -> bool {
        debug_assert!(self.guard.shares_lock_with(account.guard()));
        self.pool.record_touch(account.number());

        if amount <= 0 {
            return false;
        }
        let Some(permit) = self.pool.acquire(timeout) else {
            debug!(atm = %self.id, account = %account.number(), "no processor slot free");
            return false;
        };

        let held = self.guard.lock();
        let balance = account.balance();
        let success = if balance >= amount {
            account.set_balance(balance - amount).is_ok()
        } else {
            false
        };
        drop(held);
        drop(permit);
        success
    }
}
