use crate::crypto::Hash;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

const SENT_SHIFT: u32 = 32;
const ERRORED_MASK: u64 = u32::MAX as u64;

// Submission counters shared by every worker.
// `sent` and `errored` live in the same atomic word so a single load
// always sees `total == sent + errored`. Each half saturates at
// `u32::MAX` and never carries into the other.
#[derive(Default)]
pub struct Counters {
    outcomes: AtomicU64,
    generated: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub generated: u64,
    pub total: u64,
    pub sent: u64,
    pub errored: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    // A distinct transaction was handed to the submission engine
    pub fn record_generated(&self) {
        self.generated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_sent(&self) {
        self.bump_outcome(|outcomes| {
            ((outcomes >> SENT_SHIFT) < ERRORED_MASK).then(|| outcomes + (1 << SENT_SHIFT))
        });
    }

    pub fn record_error(&self) {
        self.bump_outcome(|outcomes| ((outcomes & ERRORED_MASK) < ERRORED_MASK).then(|| outcomes + 1));
    }

    fn bump_outcome(&self, f: impl FnMut(u64) -> Option<u64>) {
        let _ = self.outcomes.fetch_update(Ordering::SeqCst, Ordering::SeqCst, f);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let outcomes = self.outcomes.load(Ordering::SeqCst);
        let sent = outcomes >> SENT_SHIFT;
        let errored = outcomes & ERRORED_MASK;
        CounterSnapshot {
            generated: self.generated.load(Ordering::SeqCst),
            total: sent + errored,
            sent,
            errored,
        }
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total TX: {} TX success: {} TX errors: {}",
            self.total, self.sent, self.errored
        )
    }
}

// Hashes of every successfully submitted transaction, append only
#[derive(Default)]
pub struct TransactionLedger {
    hashes: Mutex<Vec<Hash>>,
}

impl TransactionLedger {
    pub fn append(&self, hash: Hash) {
        self.hashes.lock().push(hash);
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Hash> {
        self.hashes.lock().clone()
    }
}

// Which counters a submission is accounted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Registration,
    Payload,
}

// Process-wide statistics of a run
#[derive(Default)]
pub struct RunStats {
    pub registrations: Counters,
    pub transactions: Counters,
    pub ledger: TransactionLedger,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self, category: Category) -> &Counters {
        match category {
            Category::Registration => &self.registrations,
            Category::Payload => &self.transactions,
        }
    }
}
