//! In-process ledger.
//!
//! Enforces per-sender sequences, minimum fees, balances and idempotency
//! keys. Faults can be scripted to exercise the retry paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::{Ledger, LedgerError, Receipt, SubmitHandle, SubmitStatus, Submission};

/// A scripted misbehavior, consumed by the next submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail the submission with this error without committing.
    Fail(LedgerError),
    /// Commit, but report pending for this many status polls.
    Stall(u32),
    /// Accept without committing, then report this error when polled.
    RejectOnPoll(LedgerError),
}

/// An operation the ledger committed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEntry {
    pub receipt: Receipt,
    pub sender: String,
    pub idempotency_key: String,
    pub charge: u64,
    pub payload: Value,
}

#[derive(Debug)]
struct Pending {
    outcome: Result<Receipt, LedgerError>,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct State {
    sequences: HashMap<String, u64>,
    balances: HashMap<String, u64>,
    committed: Vec<CommittedEntry>,
    by_key: HashMap<String, Receipt>,
    pending: HashMap<SubmitHandle, Pending>,
    faults: VecDeque<Fault>,
    submissions: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    min_fee: u64,
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_fee(mut self, min_fee: u64) -> Self {
        self.min_fee = min_fee;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit `amount` to `account`.
    pub fn fund(&self, account: &str, amount: u64) {
        let mut state = self.state();
        let balance = state.balances.entry(account.to_string()).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance(&self, account: &str) -> u64 {
        self.state().balances.get(account).copied().unwrap_or(0)
    }

    /// Queue a fault for an upcoming submission.
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Simulate another client consuming `sender`'s next sequence number.
    pub fn advance_sequence(&self, sender: &str) {
        *self.state().sequences.entry(sender.to_string()).or_default() += 1;
    }

    pub fn committed(&self) -> Vec<CommittedEntry> {
        self.state().committed.clone()
    }

    /// Number of submit calls seen, including failed ones.
    pub fn submissions(&self) -> usize {
        self.state().submissions
    }

    fn commit(&self, state: &mut State, submission: &Submission) -> Result<Receipt, LedgerError> {
        if let Some(receipt) = state.by_key.get(&submission.idempotency_key) {
            return Err(LedgerError::AlreadyApplied(receipt.clone()));
        }

        let expected = state
            .sequences
            .get(&submission.sender)
            .copied()
            .unwrap_or(0);
        if submission.sequence != expected {
            return Err(LedgerError::SequenceConflict {
                expected,
                got: submission.sequence,
            });
        }

        if submission.fee < self.min_fee {
            return Err(LedgerError::Underpriced {
                min_fee: self.min_fee,
                offered: submission.fee,
            });
        }

        let needed = submission.charge.saturating_add(submission.fee);
        let available = state.balances.get(&submission.sender).copied().unwrap_or(0);
        if needed > available {
            return Err(LedgerError::InsufficientBalance { needed, available });
        }

        if needed > 0 {
            state
                .balances
                .insert(submission.sender.clone(), available - needed);
        }
        state.sequences.insert(submission.sender.clone(), expected + 1);

        let receipt = Receipt {
            reference: format!("L{}", state.committed.len() + 1),
            sequence: submission.sequence,
            fee: submission.fee,
        };
        state
            .by_key
            .insert(submission.idempotency_key.clone(), receipt.clone());
        state.committed.push(CommittedEntry {
            receipt: receipt.clone(),
            sender: submission.sender.clone(),
            idempotency_key: submission.idempotency_key.clone(),
            charge: submission.charge,
            payload: submission.payload.clone(),
        });
        Ok(receipt)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn next_sequence(&self, sender: &str) -> Result<u64, LedgerError> {
        Ok(self.state().sequences.get(sender).copied().unwrap_or(0))
    }

    async fn submit(&self, submission: &Submission) -> Result<SubmitHandle, LedgerError> {
        let mut state = self.state();
        state.submissions += 1;

        let polls_left = match state.faults.pop_front() {
            Some(Fault::Fail(e)) => {
                trace!(sender = %submission.sender, error = %e, "Injected submit failure");
                return Err(e);
            }
            Some(Fault::RejectOnPoll(e)) => {
                let handle = SubmitHandle(format!("R{}", state.submissions));
                state.pending.insert(
                    handle.clone(),
                    Pending {
                        outcome: Err(e),
                        polls_left: 0,
                    },
                );
                return Ok(handle);
            }
            Some(Fault::Stall(polls)) => polls,
            None => 0,
        };

        let receipt = self.commit(&mut state, submission)?;
        trace!(
            sender = %submission.sender,
            sequence = submission.sequence,
            reference = %receipt.reference,
            "Committed"
        );

        let handle = SubmitHandle(receipt.reference.clone());
        state.pending.insert(
            handle.clone(),
            Pending {
                outcome: Ok(receipt),
                polls_left,
            },
        );
        Ok(handle)
    }

    /// A handle is forgotten once its final status has been reported.
    async fn status(&self, handle: &SubmitHandle) -> Result<SubmitStatus, LedgerError> {
        let mut state = self.state();
        let Some(pending) = state.pending.get_mut(handle) else {
            return Err(LedgerError::Rejected(format!("unknown handle {}", handle.0)));
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(SubmitStatus::Pending);
        }
        let Some(pending) = state.pending.remove(handle) else {
            return Err(LedgerError::Rejected(format!("unknown handle {}", handle.0)));
        };
        Ok(match pending.outcome {
            Ok(receipt) => SubmitStatus::Confirmed(receipt),
            Err(e) => SubmitStatus::Rejected(e),
        })
    }
}
