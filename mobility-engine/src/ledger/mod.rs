//! Ledger transactions.
//!
//! A [`LedgerTxEngine`] applies a local [`Mutation`], submits the matching
//! operation to a [`Ledger`], retries transient failures with exponential
//! backoff and rolls the mutation back when the ledger refuses for good.

mod config;
mod engine;
mod error;
mod memory;
mod sequence;
mod state;

pub use config::RetryConfig;
pub use engine::{LedgerTxEngine, TxOutcome};
pub use error::{ErrorClass, LedgerError, MutationError};
pub use memory::{CommittedEntry, Fault, InMemoryLedger};
pub use state::{IllegalTransition, LedgerTransaction, TxState};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Proof that the ledger committed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: String,
    pub sequence: u64,
    pub fee: u64,
}

/// Handle for polling a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmitHandle(pub String);

/// What the ledger currently says about a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitStatus {
    Pending,
    Confirmed(Receipt),
    Rejected(LedgerError),
}

/// One signed-and-sequenced operation as sent to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub sender: String,
    pub sequence: u64,
    pub fee: u64,
    /// Amount debited from the sender on commit.
    pub charge: u64,
    pub idempotency_key: String,
    pub payload: Value,
}

/// A shared ledger with per-sender sequence numbers.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// The sequence number the ledger expects next from `sender`.
    async fn next_sequence(&self, sender: &str) -> Result<u64, LedgerError>;

    /// Submit an operation. Success means accepted, not yet final.
    async fn submit(&self, submission: &Submission) -> Result<SubmitHandle, LedgerError>;

    /// Poll the finality of an accepted submission.
    async fn status(&self, handle: &SubmitHandle) -> Result<SubmitStatus, LedgerError>;
}

/// A local state change that must be undone if its ledger operation fails.
///
/// `commit` and `revert` run on the settling task, so exactly one of them
/// sees every applied change even when the caller stops waiting.
pub trait Mutation: Send + 'static {
    /// Evidence of the applied change, consumed by `commit` or `revert`.
    type Applied: Send + 'static;
    /// Handed back to the caller once the ledger has committed.
    type Committed: Send + 'static;
    type Error: std::error::Error + Send + 'static;

    fn apply(&mut self) -> Result<Self::Applied, Self::Error>;

    /// Finalize the change after the ledger committed it.
    fn commit(&mut self, applied: Self::Applied, receipt: &Receipt) -> Self::Committed;

    fn revert(&mut self, applied: Self::Applied) -> Result<(), Self::Error>;

    /// Ledger payload describing the applied change.
    fn payload(&self, _applied: &Self::Applied) -> Value {
        Value::Null
    }
}

/// A mutation built from a pair of closures.
pub struct FnMutation<A, R> {
    apply: A,
    revert: R,
}

impl<A, R> FnMutation<A, R> {
    pub fn new(apply: A, revert: R) -> Self {
        Self { apply, revert }
    }
}

impl<T, A, R> Mutation for FnMutation<A, R>
where
    T: Send + 'static,
    A: FnMut() -> Result<T, MutationError> + Send + 'static,
    R: FnMut(T) -> Result<(), MutationError> + Send + 'static,
{
    type Applied = T;
    type Committed = T;
    type Error = MutationError;

    fn apply(&mut self) -> Result<T, MutationError> {
        (self.apply)()
    }

    fn commit(&mut self, applied: T, _receipt: &Receipt) -> T {
        applied
    }

    fn revert(&mut self, applied: T) -> Result<(), MutationError> {
        (self.revert)(applied)
    }
}

/// Everything the engine needs to run one transaction.
#[derive(Debug, Clone)]
pub struct Operation<M> {
    pub sender: String,
    /// Stable across resubmissions of the same logical operation.
    pub idempotency_key: String,
    pub charge: u64,
    pub fee: u64,
    pub mutation: M,
}

impl<M: Mutation> Operation<M> {
    pub fn new(sender: &str, idempotency_key: &str, mutation: M) -> Self {
        Self {
            sender: sender.to_string(),
            idempotency_key: idempotency_key.to_string(),
            charge: 0,
            fee: 0,
            mutation,
        }
    }

    pub fn with_charge(mut self, charge: u64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }
}
