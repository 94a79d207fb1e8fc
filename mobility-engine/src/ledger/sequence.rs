//! Per-sender sequence counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

/// Next sequence number for one sender. `None` until read from the ledger,
/// and again after a conflict so the next submission resynchronizes.
pub(crate) type SequenceSlot = Arc<AsyncMutex<Option<u64>>>;

/// Lazily populated table of sender slots.
///
/// Holding a slot's lock serializes sequence assignment and submission for
/// that sender; different senders never contend.
#[derive(Debug, Default)]
pub(crate) struct SequenceTable {
    senders: Mutex<HashMap<String, SequenceSlot>>,
}

impl SequenceTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn slot(&self, sender: &str) -> SequenceSlot {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders
            .entry(sender.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }
}
