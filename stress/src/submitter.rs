use crate::{
    crypto::Address,
    daemon_api::SharedDaemonApi,
    stats::{Category, RunStats},
    transaction::Transaction,
};
use log::{debug, trace};
use std::sync::Arc;

// Sends transactions to the daemon and keeps the run statistics
pub struct Submitter {
    daemon: SharedDaemonApi,
    stats: Arc<RunStats>,
    repeat: usize,
}

impl Submitter {
    pub fn new(daemon: SharedDaemonApi, stats: Arc<RunStats>, repeat: usize) -> Self {
        Self {
            daemon,
            stats,
            repeat: repeat.max(1),
        }
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    // Send `tx` `repeat` times, each attempt counted on its own.
    // `sender` is the account relaying the transaction, used for logs only.
    // Returns the number of accepted attempts.
    pub async fn submit(&self, category: Category, sender: &Address, tx: &Transaction) -> usize {
        let counters = self.stats.counters(category);
        counters.record_generated();

        if log::log_enabled!(log::Level::Trace) {
            trace!("{} sending tx {} ({} bytes)", sender, tx.hash(), tx.size());
        }

        let mut accepted = 0;
        for attempt in 0..self.repeat {
            match self.daemon.submit_transaction(tx).await {
                Ok(()) => {
                    counters.record_sent();
                    self.stats.ledger.append(tx.hash().clone());
                    accepted += 1;
                }
                Err(e) => {
                    counters.record_error();
                    debug!(
                        "Error while sending tx {} (attempt {}/{}) from {}: {}",
                        tx.hash(),
                        attempt + 1,
                        self.repeat,
                        sender,
                        e
                    );
                }
            }
        }
        accepted
    }

    // A transaction that couldn't even be built
    pub fn record_build_failure(&self, category: Category) {
        self.stats.counters(category).record_error();
    }
}
