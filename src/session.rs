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

//! End-to-end transaction sessions.
//!
//! A session is one transaction request taken through admission control,
//! the machine, and back: acquire a gate permit, dispatch to the machine,
//! record the outcome, optionally meet the cohort at a rendezvous
//! checkpoint, release the permit.

use crate::account::Account;
use crate::atm::Atm;
use crate::base::{AccountNumber, AtmId};
use crate::gate::ConcurrencyGate;
use crossbeam::channel;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Supported transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    /// Parses a requested kind.
    ///
    /// Returns `None` for anything other than "deposit" or "withdraw"
    /// (case-insensitive); sessions report an unrecognized kind as a
    /// failure without touching the machine.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_lowercase().as_str() {
            "deposit" => Some(Self::Deposit),
            "withdraw" => Some(Self::Withdraw),
            _ => None,
        }
    }
}

/// Immutable record of one completed session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub session: String,
    pub atm: AtmId,
    pub account: AccountNumber,
    pub amount: i64,
    /// The kind as requested, verbatim, so unrecognized kinds still show
    /// up in records.
    pub kind: String,
    pub success: bool,
}

/// One queued transaction request.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub kind: String,
    pub amount: i64,
    pub account: Arc<Account>,
    pub atm: Arc<Atm>,
}

/// Checkpoint where a cohort of sessions meets before any proceeds.
///
/// `wait` parks until `parties` callers have arrived, or until the timeout
/// passes. A timed-out caller counts itself back out and continues — a
/// cohort member that never arrives must not wedge the others.
#[derive(Debug)]
pub struct Rendezvous {
    parties: usize,
    state: Mutex<RendezvousState>,
    cohort_met: Condvar,
}

#[derive(Debug)]
struct RendezvousState {
    arrived: usize,
    generation: u64,
}

impl Rendezvous {
    /// Creates a checkpoint for cohorts of `parties` sessions.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "rendezvous needs at least one party");
        Self {
            parties,
            state: Mutex::new(RendezvousState {
                arrived: 0,
                generation: 0,
            }),
            cohort_met: Condvar::new(),
        }
    }

    /// Cohort size for a batch run: sessions rendezvous while still
    /// holding an admission permit, so a cohort wider than the gate could
    /// never assemble.
    pub fn cohort_for(gate: &ConcurrencyGate, batch: usize) -> usize {
        batch.min(gate.capacity()).max(1)
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Waits for the cohort. Returns `true` when the full cohort met,
    /// `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cohort_met.notify_all();
            return true;
        }

        let generation = state.generation;
        while state.generation == generation {
            if self.cohort_met.wait_until(&mut state, deadline).timed_out() {
                if state.generation == generation {
                    // Count ourselves back out so a stale arrival cannot
                    // release a later cohort early.
                    state.arrived -= 1;
                    return false;
                }
                return true;
            }
        }
        true
    }
}

/// Orchestrates sessions end to end.
///
/// Owns the admission gate and, optionally, a rendezvous checkpoint that
/// every session passes through after its transaction completes, while
/// still admitted.
#[derive(Debug)]
pub struct SessionRunner {
    gate: Arc<ConcurrencyGate>,
    rendezvous: Option<Arc<Rendezvous>>,
    rendezvous_timeout: Duration,
    next_session: AtomicU64,
}

impl SessionRunner {
    /// Default bound on waiting at the rendezvous checkpoint.
    pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(gate: Arc<ConcurrencyGate>) -> Self {
        Self {
            gate,
            rendezvous: None,
            rendezvous_timeout: Self::DEFAULT_RENDEZVOUS_TIMEOUT,
            next_session: AtomicU64::new(1),
        }
    }

    /// Adds a rendezvous checkpoint. Size it with
    /// [`Rendezvous::cohort_for`].
    pub fn with_rendezvous(mut self, rendezvous: Arc<Rendezvous>) -> Self {
        self.rendezvous = Some(rendezvous);
        self
    }

    pub fn with_rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = timeout;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Runs one transaction end to end.
    ///
    /// Blocks until the gate admits the session — the sole admission
    /// control on how many sessions execute concurrently. An unrecognized
    /// `kind` yields `success = false` without touching the machine. The
    /// admission permit is released when the session returns, on every
    /// path.
    pub fn run_session(
        &self,
        kind: &str,
        amount: i64,
        account: &Account,
        atm: &Atm,
    ) -> SessionResult {
        let session = format!(
            "session-{}",
            self.next_session.fetch_add(1, Ordering::Relaxed)
        );
        let _admission = self.gate.acquire();

        let success = match TransactionKind::parse(kind) {
            Some(TransactionKind::Deposit) => atm.deposit(account, amount, Atm::DEFAULT_TIMEOUT),
            Some(TransactionKind::Withdraw) => atm.withdraw(account, amount, Atm::DEFAULT_TIMEOUT),
            None => false,
        };

        info!(
            session = %session,
            atm = %atm.id(),
            account = %account.number(),
            amount,
            kind,
            success,
            "session finished"
        );

        let result = SessionResult {
            session,
            atm: atm.id(),
            account: account.number().clone(),
            amount,
            kind: kind.to_owned(),
            success,
        };

        if let Some(rendezvous) = &self.rendezvous {
            // A straggler shows up here as a timeout; the session proceeds
            // either way — its transaction is already applied.
            rendezvous.wait(self.rendezvous_timeout);
        }

        result
    }

    /// Runs a batch of requests on a fixed-size pool of worker threads.
    ///
    /// Each worker pulls requests off a shared queue and runs them to
    /// completion. Results come back in completion order.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero or if a worker thread panics.
    pub fn run_batch(&self, requests: Vec<SessionRequest>, workers: usize) -> Vec<SessionResult> {
        assert!(workers > 0, "batch needs at least one worker");

        let (request_tx, request_rx) = channel::unbounded::<SessionRequest>();
        let (result_tx, result_rx) = channel::unbounded::<SessionResult>();
        for request in requests {
            // The channel is unbounded and the receiver is alive.
            let _ = request_tx.send(request);
        }
        drop(request_tx);

        crossbeam::thread::scope(|scope| {
            for _ in 0..workers {
                let request_rx = request_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    for request in request_rx.iter() {
                        let result = self.run_session(
                            &request.kind,
                            request.amount,
                            &request.account,
                            &request.atm,
                        );
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
        })
        .expect("session worker panicked");

        drop(result_tx);
        result_rx.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn parse_accepts_known_kinds_any_case() {
        assert_eq!(TransactionKind::parse("deposit"), Some(TransactionKind::Deposit));
        assert_eq!(TransactionKind::parse("Withdraw"), Some(TransactionKind::Withdraw));
        assert_eq!(TransactionKind::parse("WITHDRAW"), Some(TransactionKind::Withdraw));
    }

    #[test]
    fn parse_rejects_unknown_kinds() {
        assert_eq!(TransactionKind::parse("transfer"), None);
        assert_eq!(TransactionKind::parse(""), None);
    }

    #[test]
    fn full_cohort_is_released_together() {
        let rendezvous = Arc::new(Rendezvous::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let rendezvous = Arc::clone(&rendezvous);
                thread::spawn(move || rendezvous.wait(Duration::from_secs(5)))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().expect("waiter panicked"));
        }
    }

    #[test]
    fn straggler_times_out_benignly() {
        let rendezvous = Rendezvous::new(2);
        let started = Instant::now();
        assert!(!rendezvous.wait(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn timed_out_party_does_not_release_a_later_cohort_early() {
        let rendezvous = Arc::new(Rendezvous::new(2));

        // First arrival times out and counts itself back out.
        assert!(!rendezvous.wait(Duration::from_millis(30)));

        // A fresh pair must still need both arrivals.
        let waiter = {
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || rendezvous.wait(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(rendezvous.wait(Duration::from_secs(5)));
        assert!(waiter.join().expect("waiter panicked"));
    }

    #[test]
    fn cohort_never_exceeds_gate_capacity() {
        let gate = ConcurrencyGate::new(2);
        assert_eq!(Rendezvous::cohort_for(&gate, 5), 2);
        assert_eq!(Rendezvous::cohort_for(&gate, 1), 1);
        assert_eq!(Rendezvous::cohort_for(&gate, 0), 1);
    }

    #[test]
    fn reused_rendezvous_cycles_generations() {
        let rendezvous = Arc::new(Rendezvous::new(2));
        for _ in 0..3 {
            let waiter = {
                let rendezvous = Arc::clone(&rendezvous);
                thread::spawn(move || rendezvous.wait(Duration::from_secs(5)))
            };
            assert!(rendezvous.wait(Duration::from_secs(5)));
            assert!(waiter.join().expect("waiter panicked"));
        }
    }
}
