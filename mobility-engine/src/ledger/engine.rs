//! Transaction engine: local mutation, submission, retry, rollback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::domain::TxId;

use super::sequence::SequenceTable;
use super::{
    Ledger, LedgerError, LedgerTransaction, Mutation, Operation, Receipt, RetryConfig,
    SubmitHandle, SubmitStatus, Submission, TxState,
};

/// How a transaction ended.
#[derive(Debug)]
pub enum TxOutcome<C, E> {
    /// The ledger committed the operation and the mutation was finalized.
    Confirmed {
        tx: TxId,
        receipt: Receipt,
        committed: C,
    },
    /// The local mutation failed; nothing was submitted.
    Aborted { tx: TxId, error: E },
    /// The ledger refused; the local mutation was rolled back.
    Failed { tx: TxId, error: LedgerError },
    /// The ledger refused and the rollback failed too, or settlement was
    /// interrupted. Local state may be inconsistent.
    NeedsOperator {
        tx: TxId,
        error: LedgerError,
        revert_error: Option<E>,
    },
}

impl<C, E> TxOutcome<C, E> {
    pub fn tx(&self) -> TxId {
        match self {
            TxOutcome::Confirmed { tx, .. }
            | TxOutcome::Aborted { tx, .. }
            | TxOutcome::Failed { tx, .. }
            | TxOutcome::NeedsOperator { tx, .. } => *tx,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }
}

struct Inner<L> {
    ledger: Arc<L>,
    config: RetryConfig,
    sequences: SequenceTable,
    journal: Mutex<HashMap<TxId, LedgerTransaction>>,
}

/// Runs ledger-backed operations to completion.
///
/// Once a mutation has applied, the rest of the transaction, including
/// its commit or revert, runs on its own task. Dropping the `execute`
/// future does not abandon a submission halfway through.
pub struct LedgerTxEngine<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for LedgerTxEngine<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: Ledger> LedgerTxEngine<L> {
    pub fn new(ledger: Arc<L>, config: RetryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                config,
                sequences: SequenceTable::new(),
                journal: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.inner.ledger
    }

    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    /// Journal record for `tx`.
    pub fn transaction(&self, tx: TxId) -> Option<LedgerTransaction> {
        self.inner.journal().get(&tx).cloned()
    }

    /// Every journal record, oldest first.
    pub fn transactions(&self) -> Vec<LedgerTransaction> {
        let mut records: Vec<_> = self.inner.journal().values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    /// Apply `op`'s mutation, then settle it on the ledger.
    ///
    /// Recoverable ledger errors are retried with backoff. When retries run
    /// out or the error is permanent the mutation is reverted exactly once.
    pub async fn execute<M: Mutation>(
        &self,
        op: Operation<M>,
    ) -> TxOutcome<M::Committed, M::Error> {
        let Operation {
            sender,
            idempotency_key,
            charge,
            fee,
            mut mutation,
        } = op;

        let tx = TxId::generate();
        self.inner.journal().insert(
            tx,
            LedgerTransaction::new(tx, &sender, &idempotency_key, fee),
        );

        let applied = match mutation.apply() {
            Ok(applied) => applied,
            Err(error) => {
                warn!(%tx, %sender, error = %error, "Local mutation failed, not submitting");
                self.inner.advance(tx, TxState::Failed);
                return TxOutcome::Aborted { tx, error };
            }
        };

        let submission = Submission {
            payload: mutation.payload(&applied),
            sender,
            sequence: 0,
            fee,
            charge,
            idempotency_key,
        };

        let inner = self.inner.clone();
        let settling =
            tokio::spawn(async move { inner.settle(tx, submission, mutation, applied).await });

        match settling.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(%tx, error = %e, "Settlement task cancelled");
                TxOutcome::NeedsOperator {
                    tx,
                    error: LedgerError::Interrupted,
                    revert_error: None,
                }
            }
        }
    }
}

impl<L: Ledger> Inner<L> {
    fn journal(&self) -> MutexGuard<'_, HashMap<TxId, LedgerTransaction>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, tx: TxId, f: impl FnOnce(&mut LedgerTransaction)) {
        if let Some(record) = self.journal().get_mut(&tx) {
            f(record);
        }
    }

    fn advance(&self, tx: TxId, next: TxState) {
        self.update(tx, |record| {
            let from = record.state;
            match record.advance(next) {
                Ok(()) => debug!(%tx, %from, to = %next, "Transaction advanced"),
                Err(e) => warn!(%tx, error = %e, "Ignoring transition"),
            }
        });
    }

    async fn settle<M: Mutation>(
        &self,
        tx: TxId,
        mut submission: Submission,
        mut mutation: M,
        applied: M::Applied,
    ) -> TxOutcome<M::Committed, M::Error> {
        let mut retries = 0;
        let error = loop {
            self.advance(tx, TxState::Submitted);

            let error = match self.submit_once(&mut submission).await {
                Ok(receipt) => return self.confirmed(tx, receipt, &mut mutation, applied),
                Err(LedgerError::AlreadyApplied(receipt)) => {
                    debug!(%tx, reference = %receipt.reference, "Operation already on ledger");
                    return self.confirmed(tx, receipt, &mut mutation, applied);
                }
                Err(e) => e,
            };

            if !error.is_recoverable() || retries >= self.config.max_retries {
                break error;
            }

            retries += 1;
            if matches!(error, LedgerError::Underpriced { .. }) {
                submission.fee = self.config.bumped_fee(submission.fee);
            }
            let delay = self.config.delay_for_attempt(retries);
            warn!(
                %tx,
                retries,
                fee = submission.fee,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Ledger submission failed, retrying"
            );
            let fee = submission.fee;
            self.update(tx, |record| {
                record.retries = retries;
                record.fee = fee;
                record.last_error = Some(error.clone());
            });
            self.advance(tx, TxState::Retrying);
            tokio::time::sleep(delay).await;
        };

        self.update(tx, |record| record.last_error = Some(error.clone()));
        self.advance(tx, TxState::Failed);

        match mutation.revert(applied) {
            Ok(()) => {
                self.advance(tx, TxState::RolledBack);
                info!(%tx, retries, error = %error, "Transaction failed, local mutation rolled back");
                TxOutcome::Failed { tx, error }
            }
            Err(revert_error) => {
                error!(
                    %tx,
                    error = %error,
                    revert_error = %revert_error,
                    "Rollback failed, operator attention needed"
                );
                TxOutcome::NeedsOperator {
                    tx,
                    error,
                    revert_error: Some(revert_error),
                }
            }
        }
    }

    fn confirmed<M: Mutation>(
        &self,
        tx: TxId,
        receipt: Receipt,
        mutation: &mut M,
        applied: M::Applied,
    ) -> TxOutcome<M::Committed, M::Error> {
        let stored = receipt.clone();
        self.update(tx, |record| record.receipt = Some(stored));
        self.advance(tx, TxState::Confirmed);
        let committed = mutation.commit(applied, &receipt);
        info!(%tx, reference = %receipt.reference, "Transaction confirmed");
        TxOutcome::Confirmed {
            tx,
            receipt,
            committed,
        }
    }

    /// Sequence, submit and wait for finality once.
    async fn submit_once(&self, submission: &mut Submission) -> Result<Receipt, LedgerError> {
        let handle = {
            let slot = self.sequences.slot(&submission.sender);
            let mut next = slot.lock().await;
            let sequence = match *next {
                Some(sequence) => sequence,
                None => self.ledger.next_sequence(&submission.sender).await?,
            };
            submission.sequence = sequence;

            match self.ledger.submit(submission).await {
                Ok(handle) => {
                    *next = Some(sequence + 1);
                    handle
                }
                Err(e) => {
                    *next = match e {
                        LedgerError::SequenceConflict { .. } => {
                            debug!(sender = %submission.sender, "Sequence conflict, resyncing");
                            None
                        }
                        _ => Some(sequence),
                    };
                    return Err(e);
                }
            }
        };

        self.await_confirmation(&handle).await
    }

    async fn await_confirmation(&self, handle: &SubmitHandle) -> Result<Receipt, LedgerError> {
        for _ in 0..self.config.confirm_polls.max(1) {
            match self.ledger.status(handle).await? {
                SubmitStatus::Confirmed(receipt) => return Ok(receipt),
                SubmitStatus::Rejected(e) => return Err(e),
                SubmitStatus::Pending => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
        Err(LedgerError::Timeout)
    }
}
