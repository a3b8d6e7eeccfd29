//! Exactly-once contract deployment shared by all workers.
//!
//! Every worker calls [`DeploymentGate::try_claim`]; the single winner
//! deploys the contract and waits for its inclusion while the others go
//! straight to the deployment barrier. Nobody leaves the barrier before the
//! leader does, so no contract call is ever built without a contract id.

use crate::{
    barrier::wait_barrier,
    crypto::Hash,
    daemon_api::{DaemonApi, DaemonError},
    shutdown::{sleep_or_cancel, Cancelled},
    transaction::TransactionRequest,
    wallet::{Wallet, WalletError},
};
use log::{debug, error, info, warn};
use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        OnceLock,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

const PENDING: u8 = 0;
const CLAIMED: u8 = 1;
const DONE: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("timed out after {0:?} waiting for the contract deployment")]
    TimedOut(Duration),
    #[error("error while building the deployment transaction: {0}")]
    Wallet(#[from] WalletError),
    #[error("error while deploying the contract: {0}")]
    Daemon(#[from] DaemonError),
    #[error("contract deployment failed on another worker")]
    LeaderFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Pending,
    Claimed,
    Done,
    Failed,
}

pub struct DeploymentGate {
    state: AtomicU8,
    contract: OnceLock<Hash>,
    barrier: Barrier,
    timeout: Option<Duration>,
}

impl DeploymentGate {
    pub fn new(workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            contract: OnceLock::new(),
            barrier: Barrier::new(workers),
            timeout,
        }
    }

    // Only one caller ever gets true
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn state(&self) -> DeploymentState {
        match self.state.load(Ordering::Acquire) {
            PENDING => DeploymentState::Pending,
            CLAIMED => DeploymentState::Claimed,
            DONE => DeploymentState::Done,
            _ => DeploymentState::Failed,
        }
    }

    pub fn contract(&self) -> Option<&Hash> {
        self.contract.get()
    }

    fn finish(&self, success: bool) {
        let next = if success { DONE } else { FAILED };
        // only the claimer moves the gate out of CLAIMED
        let _ = self
            .state
            .compare_exchange(CLAIMED, next, Ordering::AcqRel, Ordering::Acquire);
    }

    // Deploy `code` with `wallet` if this worker wins the claim, then wait
    // for every worker at the deployment barrier. Returns the contract id.
    pub async fn deploy_once(
        &self,
        worker: usize,
        wallet: &dyn Wallet,
        code: &str,
        daemon: &dyn DaemonApi,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Hash, DeploymentError> {
        if self.try_claim() {
            info!("Worker #{} elected to deploy the contract", worker);
            let result = self
                .deploy(wallet, code, daemon, poll_interval, cancel)
                .await;
            if let Err(e) = &result {
                error!("Worker #{} failed to deploy the contract: {}", worker, e);
            }
            self.finish(result.is_ok());
            // the other workers can't unwind a barrier cohort on their own
            result?;
        }

        match wait_barrier(&self.barrier, self.timeout, cancel).await {
            Ok(_) => {}
            Err(Some(timeout)) => return Err(DeploymentError::TimedOut(timeout)),
            Err(None) => return Err(Cancelled.into()),
        }

        match self.state() {
            DeploymentState::Done => self
                .contract
                .get()
                .cloned()
                .ok_or(DeploymentError::LeaderFailed),
            _ => Err(DeploymentError::LeaderFailed),
        }
    }

    async fn deploy(
        &self,
        wallet: &dyn Wallet,
        code: &str,
        daemon: &dyn DaemonApi,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DeploymentError> {
        let tx = wallet.build_transaction(&TransactionRequest::deploy(code.to_owned()))?;
        daemon.submit_transaction(&tx).await?;

        let contract = tx.hash().clone();
        info!("Contract deployment transaction {} submitted", contract);
        let _ = self.contract.set(contract.clone());

        loop {
            sleep_or_cancel(cancel, poll_interval).await?;
            let statuses = match daemon.get_transactions(std::slice::from_ref(&contract)).await {
                Ok(statuses) => statuses,
                Err(e) => {
                    warn!("Error while fetching contract {} status: {}", contract, e);
                    continue;
                }
            };
            if statuses.first().is_some_and(|status| status.is_included()) {
                info!("Contract {} deployed", contract);
                return Ok(());
            }
            debug!("Contract {} not yet included in a block", contract);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        daemon_api::{flaky::FlakyDaemon, Devnet, DevnetConfig},
        transaction::TransactionKind,
        wallet::SoftwareWallet,
    };
    use proptest::prelude::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    const CODE: &str = "Function Initialize() Uint64\n10 RETURN 0\nEnd Function";

    proptest! {
        #[test]
        fn test_single_winner(claimers in 1usize..16) {
            let gate = Arc::new(DeploymentGate::new(claimers, None));
            let winners = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..claimers)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    let winners = Arc::clone(&winners);
                    thread::spawn(move || {
                        if gate.try_claim() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            prop_assert_eq!(winners.load(Ordering::SeqCst), 1);
            prop_assert_eq!(gate.state(), DeploymentState::Claimed);
            prop_assert!(!gate.try_claim());
        }
    }

    async fn registered_wallet(devnet: &Devnet) -> SoftwareWallet {
        let wallet = SoftwareWallet::random();
        devnet
            .submit_transaction(&wallet.registration_transaction().unwrap())
            .await
            .unwrap();
        devnet.mine_block();
        wallet
    }

    #[tokio::test]
    async fn test_deploy_once_across_workers() {
        let devnet = Arc::new(Devnet::new(DevnetConfig {
            block_time: Duration::from_millis(20),
            reject_all: false,
        }));
        let cancel = CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.clone());

        let gate = Arc::new(DeploymentGate::new(3, None));
        let mut handles = Vec::new();
        for worker in 0..3 {
            let wallet = registered_wallet(&devnet).await;
            let gate = Arc::clone(&gate);
            let devnet = Arc::clone(&devnet);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                gate.deploy_once(
                    worker,
                    &wallet,
                    CODE,
                    devnet.as_ref(),
                    Duration::from_millis(10),
                    &cancel,
                )
                .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        cancel.cancel();
        producer.await.unwrap();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(gate.state(), DeploymentState::Done);
        assert_eq!(gate.contract(), Some(&ids[0]));
        assert_eq!(devnet.count_accepted(|k| *k == TransactionKind::Deploy), 1);
    }

    #[tokio::test]
    async fn test_inclusion_poll_survives_daemon_errors() {
        let devnet = Arc::new(Devnet::new(DevnetConfig {
            block_time: Duration::from_millis(20),
            reject_all: false,
        }));
        let cancel = CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.clone());
        let wallet = registered_wallet(&devnet).await;
        let flaky = FlakyDaemon::new(Arc::clone(&devnet), 3);

        let gate = DeploymentGate::new(1, None);
        let id = gate
            .deploy_once(0, &wallet, CODE, &flaky, Duration::from_millis(10), &cancel)
            .await
            .unwrap();
        cancel.cancel();
        producer.await.unwrap();

        assert_eq!(gate.state(), DeploymentState::Done);
        assert_eq!(gate.contract(), Some(&id));
        assert_eq!(devnet.count_accepted(|k| *k == TransactionKind::Deploy), 1);
    }

    #[tokio::test]
    async fn test_failed_deployment_releases_nobody_with_an_id() {
        // the leader is rejected, the follower must not get a contract id
        let devnet = Arc::new(Devnet::new(DevnetConfig {
            block_time: Duration::from_millis(20),
            reject_all: true,
        }));
        let cancel = CancellationToken::new();
        let gate = Arc::new(DeploymentGate::new(2, None));

        let leader = SoftwareWallet::random();
        let result = gate
            .deploy_once(0, &leader, CODE, devnet.as_ref(), Duration::from_millis(10), &cancel)
            .await;
        assert!(matches!(result, Err(DeploymentError::Daemon(_))));
        assert_eq!(gate.state(), DeploymentState::Failed);

        // the follower is stuck at the barrier until the run is cancelled
        let follower = {
            let gate = Arc::clone(&gate);
            let devnet = Arc::clone(&devnet);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let wallet = SoftwareWallet::random();
                gate.deploy_once(1, &wallet, CODE, devnet.as_ref(), Duration::from_millis(10), &cancel)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        assert!(matches!(
            follower.await.unwrap(),
            Err(DeploymentError::Cancelled(_))
        ));
    }
}
