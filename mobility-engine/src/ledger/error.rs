//! Ledger error types and their retry classification.

use super::Receipt;

/// How the engine should react to a ledger error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retry with backoff.
    Recoverable,
    /// Permanent; roll back.
    NonRecoverable,
    /// The operation is already on the ledger; treat as success.
    AlreadyApplied,
}

/// Errors reported by a ledger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Submitted sequence number does not match the sender's next one
    #[error("sequence conflict: expected {expected}, got {got}")]
    SequenceConflict { expected: u64, got: u64 },

    /// No answer within the allotted time
    #[error("ledger timed out")]
    Timeout,

    /// Offered fee is below the ledger's minimum
    #[error("fee {offered} below minimum {min_fee}")]
    Underpriced { min_fee: u64, offered: u64 },

    /// Ledger temporarily unreachable
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Sender cannot cover charge and fee
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    /// Ledger refused the operation
    #[error("rejected: {0}")]
    Rejected(String),

    /// Sender may not submit this operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An operation with the same idempotency key is already committed
    #[error("already applied as {}", .0.reference)]
    AlreadyApplied(Receipt),

    /// The settling task was cancelled before reaching a terminal state
    #[error("settlement interrupted")]
    Interrupted,
}

impl LedgerError {
    /// Classify this error for retry handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::SequenceConflict { .. }
            | LedgerError::Timeout
            | LedgerError::Underpriced { .. }
            | LedgerError::Unavailable(_) => ErrorClass::Recoverable,
            LedgerError::InsufficientBalance { .. }
            | LedgerError::Rejected(_)
            | LedgerError::Unauthorized(_)
            | LedgerError::Interrupted => ErrorClass::NonRecoverable,
            LedgerError::AlreadyApplied(_) => ErrorClass::AlreadyApplied,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }
}

/// Failure of a local mutation or its rollback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct MutationError(pub String);

impl MutationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
