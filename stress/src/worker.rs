use crate::{
    barrier::{BarrierError, Phase, PhaseBarriers},
    config::{ContractDescriptor, ContractTarget, RunConfig, StressMode},
    contract::{DeploymentError, DeploymentGate},
    crypto::Hash,
    daemon_api::SharedDaemonApi,
    generator::{PayloadPolicy, TransactionGenerator},
    provisioner::{Account, ProvisionError, Provisioner},
    shutdown::{sleep_or_cancel, Cancelled},
    stats::{Category, RunStats},
    storage::{StorageError, WalletStore},
    submitter::Submitter,
    transaction::Transaction,
    wallet::{WalletError, WalletProvider},
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Barrier(#[from] BarrierError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("no contract deployment gate configured")]
    MissingDeploymentGate,
    #[error("worker has no account")]
    NoAccounts,
}

impl WorkerError {
    // The worker stopped because the run was cancelled, not because it failed
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WorkerError::Cancelled(_)
                | WorkerError::Barrier(BarrierError::Cancelled(_))
                | WorkerError::Provision(ProvisionError::Cancelled(_))
                | WorkerError::Deployment(DeploymentError::Cancelled(_))
        )
    }
}

// Everything shared by the workers of a run
pub struct WorkerContext {
    pub config: Arc<RunConfig>,
    pub daemon: SharedDaemonApi,
    pub wallets: Arc<dyn WalletProvider>,
    pub stats: Arc<RunStats>,
    pub barriers: Arc<PhaseBarriers>,
    pub deployment: Option<Arc<DeploymentGate>>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker: usize,
    pub accounts: usize,
    // accounts opened from the wallets file
    pub restored: usize,
    // registration transactions built by this worker
    pub registrations: usize,
    // payload transactions built by this worker, over all rounds
    pub generated: usize,
}

pub struct Worker {
    id: usize,
    context: Arc<WorkerContext>,
    submitter: Submitter,
    accounts: Vec<Account>,
    store: Option<WalletStore>,
    summary: WorkerSummary,
}

impl Worker {
    pub fn new(id: usize, context: Arc<WorkerContext>) -> Self {
        let config = &context.config;
        let submitter = Submitter::new(context.daemon.clone(), context.stats.clone(), config.repeat_tx);
        let store = config
            .use_disk
            .then(|| WalletStore::new(&config.wallets_dir, id));
        let accounts = Vec::with_capacity(config.accounts_per_thread);

        Self {
            id,
            submitter,
            accounts,
            store,
            summary: WorkerSummary {
                worker: id,
                ..WorkerSummary::default()
            },
            context,
        }
    }

    // Quota indexes owned by this worker
    pub fn account_range(&self) -> std::ops::Range<usize> {
        let per_thread = self.context.config.accounts_per_thread;
        self.id * per_thread..(self.id + 1) * per_thread
    }

    pub async fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        let blobs = match &self.store {
            Some(store) => store.load().await?,
            None => Vec::new(),
        };

        let result = self.run_phases(&blobs).await;

        // save whatever got provisioned, even when the run was interrupted
        if self.store.is_some() && !self.accounts.is_empty() {
            if let Err(e) = self.save_wallets(&blobs).await {
                match result {
                    Ok(()) => return Err(e),
                    Err(cause) => {
                        error!("Worker #{}: error while saving wallets: {}", self.id, e);
                        return Err(cause);
                    }
                }
            }
        }

        result.map(|_| self.summary)
    }

    async fn run_phases(&mut self, blobs: &[Vec<u8>]) -> Result<(), WorkerError> {
        let one_time = self.context.config.mode == StressMode::OneTime;

        let registrations = self.provision(blobs).await?;

        if one_time {
            self.wait_barrier(Phase::RegistrationReady).await?;
            self.send_pending(Category::Registration, registrations).await?;
        }

        info!("Worker #{} waiting on wallets to be registered", self.id);
        self.wait_registrations().await?;
        self.settle().await?;

        if one_time {
            self.wait_barrier(Phase::RegistrationConfirmed).await?;
        }

        if self.context.config.registration_only {
            info!("Worker #{} registered {} accounts", self.id, self.accounts.len());
            return Ok(());
        }

        let contract = self.resolve_contract().await?;
        self.generate(contract).await
    }

    async fn wait_barrier(&self, phase: Phase) -> Result<(), WorkerError> {
        self.context
            .barriers
            .wait(phase, self.id, &self.context.cancel)
            .await?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.context.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    // Account relaying every transaction of the worker in one time mode
    fn sender_of_record(&self) -> Result<&Account, WorkerError> {
        self.accounts.last().ok_or(WorkerError::NoAccounts)
    }

    // Open or create the accounts of this worker. Registrations are sent right
    // away except in one time mode, where they are returned to be sent later.
    async fn provision(&mut self, blobs: &[Vec<u8>]) -> Result<Vec<Transaction>, WorkerError> {
        let config = Arc::clone(&self.context.config);
        let provisioner = Provisioner::new(
            Arc::clone(&self.context.wallets),
            self.context.daemon.clone(),
            config.skip_pow,
        );

        if !blobs.is_empty() {
            info!("Wallets from disk available for worker #{}: {}", self.id, blobs.len());
        }

        let mut pending = Vec::new();
        for (i, index) in self.account_range().enumerate() {
            self.check_cancelled()?;

            let blob = blobs.get(i).map(Vec::as_slice);
            if blob.is_some() {
                self.summary.restored += 1;
            }

            let provisioned = provisioner
                .provision(index, blob, &self.context.cancel)
                .await?;

            if let Some(tx) = provisioned.registration {
                self.summary.registrations += 1;
                if config.mode == StressMode::OneTime {
                    pending.push(tx);
                } else {
                    self.submitter
                        .submit(Category::Registration, provisioned.account.wallet().address(), &tx)
                        .await;
                }
            }
            self.accounts.push(provisioned.account);
        }

        self.summary.accounts = self.accounts.len();
        debug!(
            "Worker #{} provisioned {} accounts, {} to register",
            self.id,
            self.accounts.len(),
            self.summary.registrations
        );
        Ok(pending)
    }

    // Send a batch through the sender of record
    async fn send_pending(&self, category: Category, pending: Vec<Transaction>) -> Result<(), WorkerError> {
        if pending.is_empty() {
            return Ok(());
        }

        let sender = self.sender_of_record()?.wallet().address();
        info!("Worker #{} sending {} transactions", self.id, pending.len());
        for tx in &pending {
            self.submitter.submit(category, sender, tx).await;
        }
        Ok(())
    }

    async fn wait_registrations(&mut self) -> Result<(), WorkerError> {
        let daemon = self.context.daemon.clone();
        loop {
            let mut registered = true;
            for account in self.accounts.iter_mut().filter(|a| !a.is_registered()) {
                match account.refresh_registration(&daemon).await {
                    Ok(true) => {}
                    Ok(false) => registered = false,
                    Err(e) => {
                        warn!(
                            "Worker #{}: error while checking registration of account #{}: {}",
                            self.id,
                            account.index(),
                            e
                        );
                        registered = false;
                    }
                }
            }

            if registered {
                info!("Worker #{}: all {} accounts registered", self.id, self.accounts.len());
                return Ok(());
            }

            sleep_or_cancel(&self.context.cancel, self.context.config.timings.registration_poll).await?;
        }
    }

    // Let a few blocks pass once every account is registered
    async fn settle(&self) -> Result<(), WorkerError> {
        let blocks = self.context.config.settle_blocks;
        if blocks == 0 {
            return Ok(());
        }

        let start = self.topoheight().await?;
        debug!("Worker #{} waiting until topoheight {}", self.id, start + blocks + 1);
        self.wait_topoheight_above(start + blocks).await
    }

    async fn wait_topoheight_above(&self, topoheight: u64) -> Result<(), WorkerError> {
        while self.topoheight().await? <= topoheight {
            sleep_or_cancel(&self.context.cancel, self.context.config.timings.block_poll).await?;
        }
        Ok(())
    }

    // Current topoheight, retried until the daemon answers
    async fn topoheight(&self) -> Result<u64, Cancelled> {
        loop {
            match self.context.daemon.get_topoheight().await {
                Ok(topoheight) => return Ok(topoheight),
                Err(e) => {
                    warn!("Worker #{}: error while fetching topoheight: {}", self.id, e);
                    sleep_or_cancel(&self.context.cancel, self.context.config.timings.block_poll).await?;
                }
            }
        }
    }

    async fn resolve_contract(&self) -> Result<Option<(ContractDescriptor, Hash)>, WorkerError> {
        let descriptor = match &self.context.config.contract {
            Some(descriptor) => descriptor,
            None => return Ok(None),
        };

        let id = match &descriptor.target {
            ContractTarget::Existing(id) => id.clone(),
            ContractTarget::Deploy { code } => {
                let gate = self
                    .context
                    .deployment
                    .as_ref()
                    .ok_or(WorkerError::MissingDeploymentGate)?;
                gate.deploy_once(
                    self.id,
                    self.sender_of_record()?.wallet(),
                    code,
                    self.context.daemon.as_ref(),
                    self.context.config.timings.deployment_poll,
                    &self.context.cancel,
                )
                .await?
            }
        };

        Ok(Some((descriptor.clone(), id)))
    }

    async fn generate(&mut self, contract: Option<(ContractDescriptor, Hash)>) -> Result<(), WorkerError> {
        let config = Arc::clone(&self.context.config);
        let policy = PayloadPolicy::select(&config, contract.as_ref().map(|(d, id)| (d, id)));
        let generator = TransactionGenerator::new(config.ring_size, policy);

        let rounds = match config.mode {
            StressMode::Spam => config.rounds,
            _ => 1,
        };

        let mut pending = Vec::new();
        for round in 0..rounds {
            if round > 0 {
                let topoheight = self.topoheight().await?;
                debug!("Worker #{} waiting for a new block before round {}", self.id, round + 1);
                self.wait_topoheight_above(topoheight).await?;
            }

            for account in &self.accounts {
                self.check_cancelled()?;

                let tx = match generator.generate(account.wallet()) {
                    Ok(tx) => tx,
                    Err(e) => {
                        debug!("Worker #{}: error while building tx for account #{}: {}", self.id, account.index(), e);
                        self.submitter.record_build_failure(Category::Payload);
                        continue;
                    }
                };
                self.summary.generated += 1;

                if config.mode == StressMode::OneTime {
                    pending.push(tx);
                } else {
                    self.submitter
                        .submit(Category::Payload, account.wallet().address(), &tx)
                        .await;
                }
            }

            if config.mode == StressMode::Spam {
                info!("Worker #{} round {}/{} done", self.id, round + 1, rounds);
            }
        }

        if config.mode == StressMode::OneTime {
            self.wait_barrier(Phase::TxGenerated).await?;
            self.send_pending(Category::Payload, pending).await?;
        }

        Ok(())
    }

    // Rewrite the wallets file: accounts of this worker first, then the
    // blobs that were beyond its quota
    async fn save_wallets(&self, blobs: &[Vec<u8>]) -> Result<(), WorkerError> {
        let store = match &self.store {
            Some(store) => store,
            None => return Ok(()),
        };

        let mut content = Vec::with_capacity(self.accounts.len().max(blobs.len()));
        for account in &self.accounts {
            content.push(account.wallet().export()?);
        }
        content.extend(blobs.iter().skip(self.accounts.len()).cloned());

        store.save(&content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Timings,
        daemon_api::{flaky::FlakyDaemon, Devnet, DevnetConfig},
        wallet::SoftwareWalletProvider,
    };
    use std::time::Duration;
    use tempfile::tempdir;

    fn fast_config(mode: StressMode) -> RunConfig {
        RunConfig {
            threads: 1,
            accounts_per_thread: 3,
            mode,
            skip_pow: true,
            settle_blocks: 1,
            timings: Timings {
                registration_poll: Duration::from_millis(10),
                deployment_poll: Duration::from_millis(10),
                confirmation_poll: Duration::from_millis(10),
                block_poll: Duration::from_millis(5),
                barrier_timeout: Some(Duration::from_secs(10)),
                shutdown_grace: Duration::from_secs(1),
            },
            ..RunConfig::default()
        }
    }

    fn context(config: RunConfig, devnet: &Arc<Devnet>, cancel: &CancellationToken) -> Arc<WorkerContext> {
        context_with(config, devnet.clone(), cancel)
    }

    fn context_with(config: RunConfig, daemon: SharedDaemonApi, cancel: &CancellationToken) -> Arc<WorkerContext> {
        let barriers = Arc::new(PhaseBarriers::new(config.threads, config.timings.barrier_timeout));
        Arc::new(WorkerContext {
            config: Arc::new(config),
            daemon,
            wallets: Arc::new(SoftwareWalletProvider),
            stats: Arc::new(RunStats::new()),
            barriers,
            deployment: None,
            cancel: cancel.clone(),
        })
    }

    fn devnet() -> Arc<Devnet> {
        Arc::new(Devnet::new(DevnetConfig {
            block_time: Duration::from_millis(10),
            reject_all: false,
        }))
    }

    #[test]
    fn test_disjoint_account_ranges() {
        let devnet = devnet();
        let cancel = CancellationToken::new();
        let context = context(fast_config(StressMode::OnCreation), &devnet, &cancel);

        let ranges: Vec<_> = (0..3)
            .map(|id| Worker::new(id, Arc::clone(&context)).account_range())
            .collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..9]);
    }

    #[tokio::test]
    async fn test_on_creation_worker() {
        let devnet = devnet();
        let cancel = CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.child_token());
        let context = context(fast_config(StressMode::OnCreation), &devnet, &cancel);

        let summary = Worker::new(0, Arc::clone(&context)).run().await.unwrap();
        cancel.cancel();
        producer.await.unwrap();

        assert_eq!(summary.accounts, 3);
        assert_eq!(summary.registrations, 3);
        assert_eq!(summary.generated, 3);
        assert_eq!(devnet.registered_accounts(), 3);

        let payload = context.stats.transactions.snapshot();
        assert_eq!(payload.sent, 3);
        assert_eq!(payload.errored, 0);
        assert_eq!(context.stats.ledger.len(), 6);
    }

    #[tokio::test]
    async fn test_wallets_reused_from_disk() {
        let dir = tempdir().unwrap();
        let devnet = devnet();
        let cancel = CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.child_token());

        let mut config = fast_config(StressMode::OnCreation);
        config.use_disk = true;
        config.registration_only = true;
        config.wallets_dir = dir.path().to_path_buf();

        let first = Worker::new(0, context(config.clone(), &devnet, &cancel))
            .run()
            .await
            .unwrap();
        assert_eq!(first.restored, 0);
        assert_eq!(first.registrations, 3);

        let store = WalletStore::new(dir.path(), 0);
        let saved = store.load().await.unwrap();
        assert_eq!(saved.len(), 3);

        // an extra blob beyond the quota is kept
        let mut extended = saved.clone();
        extended.push(SoftwareWalletProvider.create().unwrap().export().unwrap());
        store.save(&extended).await.unwrap();

        let second = Worker::new(0, context(config, &devnet, &cancel))
            .run()
            .await
            .unwrap();
        cancel.cancel();
        producer.await.unwrap();

        assert_eq!(second.restored, 3);
        assert_eq!(second.registrations, 0);
        assert_eq!(store.load().await.unwrap(), extended);
    }

    #[tokio::test]
    async fn test_cancelled_worker_unwinds() {
        // no block producer: registrations are never confirmed
        let devnet = devnet();
        let cancel = CancellationToken::new();
        let context = context(fast_config(StressMode::OnCreation), &devnet, &cancel);

        let handle = tokio::spawn(Worker::new(0, context).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled(), "{}", err);
    }

    #[tokio::test]
    async fn test_daemon_errors_while_polling_are_retried() {
        let devnet = devnet();
        let flaky = Arc::new(FlakyDaemon::new(devnet.clone(), 2));
        let cancel = CancellationToken::new();
        let producer = devnet.spawn_block_producer(cancel.child_token());

        let mut config = fast_config(StressMode::Spam);
        config.rounds = 2;
        let context = context_with(config, flaky.clone(), &cancel);

        let summary = Worker::new(0, Arc::clone(&context)).run().await.unwrap();
        cancel.cancel();
        producer.await.unwrap();

        assert_eq!(summary.accounts, 3);
        assert_eq!(summary.generated, 6);
        assert_eq!(devnet.registered_accounts(), 3);
        // only get_transactions, never used by a worker, keeps its failures
        assert_eq!(flaky.remaining_failures(), 2);
    }

    #[tokio::test]
    async fn test_save_failure_keeps_the_first_error() {
        // no block producer: the worker waits on registrations until cancelled
        let dir = tempdir().unwrap();
        let wallets_dir = dir.path().join("wallets");
        let devnet = devnet();
        let cancel = CancellationToken::new();

        let mut config = fast_config(StressMode::OnCreation);
        config.use_disk = true;
        config.wallets_dir = wallets_dir.clone();

        let handle = tokio::spawn(Worker::new(0, context(config, &devnet, &cancel)).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        // a plain file where the wallets directory should be created
        std::fs::write(&wallets_dir, b"").unwrap();
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled(), "{}", err);
        assert!(!WalletStore::new(&wallets_dir, 0).path().exists());
    }
}
