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

//! Accounts and the shared balance guard.
//!
//! # Example
//!
//! ```
//! use atm_sim_rs::{Account, BalanceGuard};
//!
//! let guard = BalanceGuard::new();
//! let account = Account::new("1234567890", 1000, guard).unwrap();
//! assert_eq!(account.balance(), 1000);
//! ```

use crate::base::AccountNumber;
use crate::error::AtmError;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// The single re-entrant lock serializing every balance read and write.
///
/// One guard is created per deployment and cloned into every [`Account`]
/// and every [`Atm`](crate::Atm); clones refer to the same underlying lock.
/// Serializing all balance mutations through one lock trades parallelism
/// for immunity to per-account lock-ordering deadlocks.
#[derive(Debug, Clone, Default)]
pub struct BalanceGuard {
    inner: Arc<ReentrantMutex<()>>,
}

impl BalanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the guard, blocking until it is available.
    ///
    /// Re-entrant: a thread already holding the guard may lock it again
    /// without deadlocking itself.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.lock()
    }

    /// `true` when `other` is a clone of this guard.
    pub fn shares_lock_with(&self, other: &BalanceGuard) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A bank account: validated number plus a non-negative balance.
///
/// The balance is only read or written while holding the injected
/// [`BalanceGuard`], so a concurrent read-modify-write cycle never observes
/// a torn value and never loses an update.
#[derive(Debug)]
pub struct Account {
    number: AccountNumber,
    guard: BalanceGuard,
    // Accessed only under `guard`. Atomic storage supplies the interior
    // mutability; the guard supplies the exclusion and ordering.
    balance: AtomicI64,
}

impl Account {
    /// Creates an account with a validated number.
    ///
    /// A negative `initial_balance` clamps to zero.
    ///
    /// # Errors
    ///
    /// Returns [`AtmError::InvalidAccountNumber`] if `number` is not
    /// exactly 10 ASCII digits.
    pub fn new(number: &str, initial_balance: i64, guard: BalanceGuard) -> Result<Self, AtmError> {
        let number = AccountNumber::parse(number)?;
        Ok(Self {
            number,
            guard,
            balance: AtomicI64::new(initial_balance.max(0)),
        })
    }

    pub fn number(&self) -> &AccountNumber {
        &self.number
    }

    pub fn guard(&self) -> &BalanceGuard {
        &self.guard
    }

    /// Reads the balance under the guard.
    pub fn balance(&self) -> i64 {
        let _held = self.guard.lock();
        self.balance.load(Ordering::Relaxed)
    }

    /// Writes the balance under the guard.
    ///
    /// # Errors
    ///
    /// Returns [`AtmError::NegativeBalance`] if `value < 0`; the stored
    /// balance is left unchanged.
    pub fn set_balance(&self, value: i64) -> Result<(), AtmError> {
        let _held = self.guard.lock();
        if value < 0 {
            return Err(AtmError::NegativeBalance);
        }
        self.balance.store(value, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_number_constructs() {
        let account = Account::new("1234567890", 50, BalanceGuard::new()).unwrap();
        assert_eq!(account.number().as_str(), "1234567890");
        assert_eq!(account.balance(), 50);
    }

    #[test]
    fn short_number_fails_construction() {
        let result = Account::new("12345", 0, BalanceGuard::new());
        assert_eq!(
            result.unwrap_err(),
            AtmError::InvalidAccountNumber("12345".to_owned())
        );
    }

    #[test]
    fn negative_initial_balance_clamps_to_zero() {
        let account = Account::new("1234567890", -250, BalanceGuard::new()).unwrap();
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn set_balance_rejects_negative_and_keeps_state() {
        let account = Account::new("1234567890", 100, BalanceGuard::new()).unwrap();
        assert_eq!(account.set_balance(-1), Err(AtmError::NegativeBalance));
        assert_eq!(account.balance(), 100);
    }

    #[test]
    fn set_balance_accepts_zero() {
        let account = Account::new("1234567890", 100, BalanceGuard::new()).unwrap();
        account.set_balance(0).unwrap();
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn guard_is_reentrant_through_accessors() {
        let guard = BalanceGuard::new();
        let account = Account::new("1234567890", 10, guard.clone()).unwrap();

        // Holding the guard, the accessors re-lock without self-deadlock.
        let held = guard.lock();
        let balance = account.balance();
        account.set_balance(balance + 5).unwrap();
        drop(held);

        assert_eq!(account.balance(), 15);
    }

    #[test]
    fn clones_share_one_lock() {
        let guard = BalanceGuard::new();
        let clone = guard.clone();
        assert!(guard.shares_lock_with(&clone));
        assert!(!guard.shares_lock_with(&BalanceGuard::new()));
    }
}
