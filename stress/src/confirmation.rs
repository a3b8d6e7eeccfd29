use crate::{
    crypto::Hash,
    daemon_api::{DaemonError, SharedDaemonApi, TransactionStatus},
};
use log::{debug, info};
use std::{
    fmt::Write as _,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{fs, time::sleep};

// Hashes per get_transactions request, the daemon refuses bigger requests
pub const GET_TRANSACTIONS_BATCH_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error("daemon returned {got} statuses for {expected} transactions")]
    IncompleteResponse { expected: usize, got: usize },
    #[error("error while writing '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub mined: usize,
    pub total: usize,
}

// Output line of a transaction: `<hash>,<topoheight or -1>,<block hash or empty>`
pub fn format_status(status: &TransactionStatus) -> String {
    let topoheight = status
        .topoheight
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-1".to_owned());
    let block = status
        .block_hash
        .as_ref()
        .map(Hash::to_hex)
        .unwrap_or_default();
    format!("{},{},{}", status.hash, topoheight, block)
}

// Matches the submitted transactions against the chain once the run is over.
// It doesn't observe the run cancellation: it only starts once the run
// stopped, a second termination signal ends the process instead.
pub struct ConfirmationPoller {
    daemon: SharedDaemonApi,
    wait_n_blocks: u64,
    poll_interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(daemon: SharedDaemonApi, wait_n_blocks: u64, poll_interval: Duration) -> Self {
        Self {
            daemon,
            wait_n_blocks,
            poll_interval,
        }
    }

    async fn wait_blocks(&self) -> Result<(), DaemonError> {
        let start = self.daemon.get_topoheight().await?;
        let target = start + self.wait_n_blocks;
        info!("Waiting for topoheight {} before fetching transactions", target + 1);

        loop {
            let topoheight = self.daemon.get_topoheight().await?;
            if topoheight > target {
                return Ok(());
            }
            debug!("Current topoheight {}, waiting for {}", topoheight, target + 1);
            sleep(self.poll_interval).await;
        }
    }

    pub async fn fetch_statuses(&self, hashes: &[Hash]) -> Result<Vec<TransactionStatus>, ConfirmationError> {
        let mut statuses = Vec::with_capacity(hashes.len());
        for batch in hashes.chunks(GET_TRANSACTIONS_BATCH_SIZE) {
            let response = self.daemon.get_transactions(batch).await?;
            if response.len() != batch.len() {
                return Err(ConfirmationError::IncompleteResponse {
                    expected: batch.len(),
                    got: response.len(),
                });
            }
            statuses.extend(response);
        }
        Ok(statuses)
    }

    // Wait for the configured blocks, then write the status of every hash in `output`.
    // Nothing is written if any request fails.
    pub async fn reconcile(
        &self,
        hashes: &[Hash],
        output: &Path,
    ) -> Result<ReconciliationReport, ConfirmationError> {
        self.wait_blocks().await?;

        info!("Fetching {} transactions from daemon", hashes.len());
        let statuses = self.fetch_statuses(hashes).await?;

        let mut content = String::new();
        let mut mined = 0;
        for status in &statuses {
            if status.is_included() {
                mined += 1;
            }
            // writing into a String can't fail
            let _ = writeln!(content, "{}", format_status(status));
        }

        fs::write(output, content)
            .await
            .map_err(|source| ConfirmationError::Write {
                path: output.to_path_buf(),
                source,
            })?;

        let report = ReconciliationReport {
            mined,
            total: statuses.len(),
        };
        info!("TXs mined: {}/{}", report.mined, report.total);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::hash,
        daemon_api::{DaemonApi, Devnet, DevnetConfig},
        wallet::{SoftwareWallet, Wallet},
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_format_status() {
        let missing = TransactionStatus::not_found(hash(b"tx"));
        assert_eq!(format_status(&missing), format!("{},-1,", hash(b"tx")));

        let mined = TransactionStatus {
            hash: hash(b"tx"),
            topoheight: Some(12),
            block_hash: Some(hash(b"block")),
        };
        assert_eq!(
            format_status(&mined),
            format!("{},12,{}", hash(b"tx"), hash(b"block"))
        );
    }

    #[tokio::test]
    async fn test_reconcile_writes_every_hash() {
        let devnet = Arc::new(Devnet::new(DevnetConfig {
            block_time: Duration::from_millis(10),
            reject_all: false,
        }));
        let cancel = tokio_util::sync::CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.clone());

        // more hashes than a single batch
        let mut hashes = Vec::new();
        for _ in 0..GET_TRANSACTIONS_BATCH_SIZE + 5 {
            let tx = SoftwareWallet::random().registration_transaction().unwrap();
            devnet.submit_transaction(&tx).await.unwrap();
            hashes.push(tx.hash().clone());
        }
        hashes.push(hash(b"never sent"));

        let dir = tempdir().unwrap();
        let output = dir.path().join("txs.csv");
        let poller = ConfirmationPoller::new(devnet.clone(), 2, Duration::from_millis(5));
        let report = poller.reconcile(&hashes, &output).await.unwrap();
        cancel.cancel();
        producer.await.unwrap();

        assert_eq!(report.total, hashes.len());
        assert_eq!(report.mined, hashes.len() - 1);

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), hashes.len());
        assert!(lines[0].starts_with(&hashes[0].to_hex()));
        assert_eq!(lines.last().unwrap(), &format!("{},-1,", hash(b"never sent")));
        for line in &lines[..lines.len() - 1] {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3);
            assert!(fields[1].parse::<u64>().is_ok());
            assert_eq!(fields[2].len(), 64);
        }
    }
}
