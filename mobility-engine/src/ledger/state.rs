//! Transaction lifecycle and journal records.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::TxId;

use super::{LedgerError, Receipt};

/// Lifecycle state of a ledger transaction.
///
/// ```text
/// pending -> submitted -> confirmed
///                      -> retrying -> submitted
///                      -> failed -> rolled_back
/// ```
///
/// `pending -> failed` covers a local mutation that never applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Pending,
    Submitted,
    Retrying,
    Confirmed,
    Failed,
    RolledBack,
}

impl TxState {
    /// Returns true if the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Retrying)
                | (Submitted, Failed)
                | (Retrying, Submitted)
                | (Retrying, Failed)
                | (Failed, RolledBack)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::Submitted => "submitted",
            TxState::Retrying => "retrying",
            TxState::Confirmed => "confirmed",
            TxState::Failed => "failed",
            TxState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted move the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transaction transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: TxState,
    pub to: TxState,
}

/// Journal record of one ledger transaction.
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub id: TxId,
    pub sender: String,
    pub idempotency_key: String,
    pub state: TxState,
    /// Every state entered, with the time it was entered.
    pub history: Vec<(TxState, DateTime<Utc>)>,
    pub retries: u32,
    pub fee: u64,
    pub last_error: Option<LedgerError>,
    pub receipt: Option<Receipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(id: TxId, sender: &str, idempotency_key: &str, fee: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            sender: sender.to_string(),
            idempotency_key: idempotency_key.to_string(),
            state: TxState::Pending,
            history: vec![(TxState::Pending, now)],
            retries: 0,
            fee,
            last_error: None,
            receipt: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, recording it in the history.
    ///
    /// # Errors
    ///
    /// Leaves the record untouched if the move is not allowed.
    pub fn advance(&mut self, next: TxState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        self.state = next;
        self.history.push((next, now));
        self.updated_at = now;
        Ok(())
    }

    /// States visited, oldest first.
    pub fn states(&self) -> Vec<TxState> {
        self.history.iter().map(|(state, _)| *state).collect()
    }

    /// Confirmed or rolled back. A failed record may still roll back.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, TxState::Confirmed | TxState::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use TxState::*;
        assert!(Pending.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Confirmed));
        assert!(Failed.can_transition_to(RolledBack));

        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!RolledBack.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Confirmed));
        assert!(!Retrying.can_transition_to(Confirmed));
        assert!(!Submitted.can_transition_to(Submitted));
    }

    #[test]
    fn advance_records_history() {
        let mut tx = LedgerTransaction::new(TxId::generate(), "alice", "k", 1);
        tx.advance(TxState::Submitted).unwrap();
        tx.advance(TxState::Retrying).unwrap();
        tx.advance(TxState::Submitted).unwrap();
        tx.advance(TxState::Confirmed).unwrap();

        assert_eq!(
            tx.states(),
            vec![
                TxState::Pending,
                TxState::Submitted,
                TxState::Retrying,
                TxState::Submitted,
                TxState::Confirmed
            ]
        );
        assert!(tx.is_resolved());
    }

    #[test]
    fn illegal_advance_is_rejected() {
        let mut tx = LedgerTransaction::new(TxId::generate(), "alice", "k", 1);
        let err = tx.advance(TxState::Confirmed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal transaction transition pending -> confirmed"
        );
        assert_eq!(tx.state, TxState::Pending);
        assert_eq!(tx.history.len(), 1);
    }
}
