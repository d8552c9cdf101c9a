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

//! # ATM Simulator
//!
//! This library models concurrent access to shared bank accounts through a
//! limited pool of transaction processors. Concurrent deposit and withdraw
//! sessions contend for a small number of processing slots and mutate
//! balances under a single shared guard, so no interleaving can race, lose
//! an update, or drive a balance negative.
//!
//! ## Core Components
//!
//! - [`Account`]: validated 10-digit number plus a guarded non-negative balance
//! - [`BalanceGuard`]: the shared re-entrant lock serializing every balance access
//! - [`ProcessorPool`]: fixed set of mutually exclusive processing slots
//! - [`Atm`]: deposit/withdraw front-end over the shared pool and guard
//! - [`ConcurrencyGate`]: counting semaphore bounding in-flight sessions
//! - [`SessionRunner`]: runs one request end to end and batches over workers
//!
//! ## Example
//!
//! ```
//! use atm_sim_rs::{Account, Atm, AtmId, BalanceGuard, ConcurrencyGate, ProcessorPool, SessionRunner};
//! use std::sync::Arc;
//!
//! let guard = BalanceGuard::new();
//! let pool = Arc::new(ProcessorPool::default());
//! let atm = Atm::new(AtmId(1), pool, guard.clone());
//! let account = Account::new("1234567890", 1000, guard).unwrap();
//!
//! let runner = SessionRunner::new(Arc::new(ConcurrencyGate::default()));
//! let result = runner.run_session("withdraw", 200, &account, &atm);
//! assert!(result.success);
//! assert_eq!(account.balance(), 800);
//! ```
//!
//! ## Concurrency Model
//!
//! Sessions run on parallel worker threads. Every transaction path
//! acquires in the same fixed order — admission gate, processor slot,
//! balance guard — and releases in reverse, so the resource classes never
//! form a circular wait. Slot acquisition is deadline-bounded and failure
//! is an ordinary boolean outcome, not an error.

pub mod account;
mod atm;
mod base;
pub mod error;
mod gate;
mod pool;
mod session;

pub use account::{Account, BalanceGuard};
pub use atm::Atm;
pub use base::{AccountNumber, AtmId};
pub use error::AtmError;
pub use gate::{ConcurrencyGate, GatePermit};
pub use pool::{ProcessorPool, ProcessorPermit};
pub use session::{
    Rendezvous, SessionRequest, SessionResult, SessionRunner, TransactionKind,
};
