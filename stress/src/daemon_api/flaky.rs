use super::{DaemonApi, DaemonError, TransactionStatus};
use crate::{
    crypto::{Address, Hash},
    transaction::Transaction,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

// Daemon dropping the first queries of each kind before forwarding them
pub struct FlakyDaemon<D> {
    inner: Arc<D>,
    topoheight_failures: AtomicUsize,
    transactions_failures: AtomicUsize,
    registration_failures: AtomicUsize,
}

impl<D: DaemonApi> FlakyDaemon<D> {
    pub fn new(inner: Arc<D>, failures: usize) -> Self {
        Self {
            inner,
            topoheight_failures: AtomicUsize::new(failures),
            transactions_failures: AtomicUsize::new(failures),
            registration_failures: AtomicUsize::new(failures),
        }
    }

    // Failures not consumed yet, over all kinds of queries
    pub fn remaining_failures(&self) -> usize {
        self.topoheight_failures.load(Ordering::SeqCst)
            + self.transactions_failures.load(Ordering::SeqCst)
            + self.registration_failures.load(Ordering::SeqCst)
    }

    fn fail(counter: &AtomicUsize) -> Result<(), DaemonError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(DaemonError::Transport("connection reset".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<D: DaemonApi> DaemonApi for FlakyDaemon<D> {
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<(), DaemonError> {
        self.inner.submit_transaction(transaction).await
    }

    async fn get_topoheight(&self) -> Result<u64, DaemonError> {
        Self::fail(&self.topoheight_failures)?;
        self.inner.get_topoheight().await
    }

    async fn get_transactions(&self, hashes: &[Hash]) -> Result<Vec<TransactionStatus>, DaemonError> {
        Self::fail(&self.transactions_failures)?;
        self.inner.get_transactions(hashes).await
    }

    async fn get_registration_topoheight(&self, address: &Address) -> Result<Option<u64>, DaemonError> {
        Self::fail(&self.registration_failures)?;
        self.inner.get_registration_topoheight(address).await
    }
}
