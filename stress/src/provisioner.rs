use crate::{
    daemon_api::{DaemonError, SharedDaemonApi},
    shutdown::Cancelled,
    transaction::Transaction,
    wallet::{SharedWallet, Wallet, WalletError, WalletProvider},
};
use log::{debug, trace};
use std::{fmt, sync::Arc, time::Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// A registration hash must start with this many zero bytes
pub const REGISTRATION_POW_ZERO_BYTES: usize = 3;

// Candidates built between two cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error("proof of work task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered { topoheight: u64 },
}

pub struct Account {
    index: usize,
    wallet: SharedWallet,
    registration: RegistrationState,
}

impl Account {
    pub fn new(index: usize, wallet: SharedWallet) -> Self {
        Self {
            index,
            wallet,
            registration: RegistrationState::Unregistered,
        }
    }

    // Index of the account in the whole run quota
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn wallet(&self) -> &dyn Wallet {
        self.wallet.as_ref()
    }

    pub fn registration(&self) -> RegistrationState {
        self.registration
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.registration, RegistrationState::Registered { .. })
    }

    // Ask the daemon whether the account got registered
    pub async fn refresh_registration(&mut self, daemon: &SharedDaemonApi) -> Result<bool, DaemonError> {
        if let Some(topoheight) = daemon
            .get_registration_topoheight(self.wallet.address())
            .await?
        {
            self.registration = RegistrationState::Registered { topoheight };
        }
        Ok(self.is_registered())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("index", &self.index)
            .field("address", self.wallet.address())
            .field("registration", &self.registration)
            .finish()
    }
}

// An account ready to be used, with its registration transaction if it
// still has to be sent
pub struct Provisioned {
    pub account: Account,
    pub registration: Option<Transaction>,
}

// Build registration candidates until one hash starts with `zero_bytes` zero bytes
fn search_registration(
    wallet: &dyn Wallet,
    zero_bytes: usize,
    cancel: &CancellationToken,
) -> Result<(Transaction, u64), ProvisionError> {
    let mut candidates: u64 = 0;
    loop {
        if candidates % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        let tx = wallet.registration_transaction()?;
        candidates += 1;
        if tx.hash().leading_zero_bytes() >= zero_bytes {
            return Ok((tx, candidates));
        }
    }
}

pub struct Provisioner {
    provider: Arc<dyn WalletProvider>,
    daemon: SharedDaemonApi,
    skip_pow: bool,
}

impl Provisioner {
    pub fn new(provider: Arc<dyn WalletProvider>, daemon: SharedDaemonApi, skip_pow: bool) -> Self {
        Self {
            provider,
            daemon,
            skip_pow,
        }
    }

    // Open the persisted wallet or create a new one, then build its
    // registration transaction when it isn't registered yet
    pub async fn provision(
        &self,
        index: usize,
        blob: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<Provisioned, ProvisionError> {
        let account = match blob {
            Some(blob) => {
                let mut account = Account::new(index, self.provider.open(blob)?);
                account.refresh_registration(&self.daemon).await?;
                account
            }
            None => Account::new(index, self.provider.create()?),
        };

        if let RegistrationState::Registered { topoheight } = account.registration() {
            debug!(
                "Account #{} {} already registered at topoheight {}",
                index,
                account.wallet().address(),
                topoheight
            );
            return Ok(Provisioned {
                account,
                registration: None,
            });
        }

        let registration = self.mine_registration(&account, cancel).await?;
        Ok(Provisioned {
            account,
            registration: Some(registration),
        })
    }

    async fn mine_registration(
        &self,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Result<Transaction, ProvisionError> {
        let zero_bytes = if self.skip_pow {
            0
        } else {
            REGISTRATION_POW_ZERO_BYTES
        };

        let wallet = Arc::clone(&account.wallet);
        let cancel = cancel.clone();
        let start = Instant::now();
        let (tx, candidates) =
            tokio::task::spawn_blocking(move || search_registration(wallet.as_ref(), zero_bytes, &cancel))
                .await
                .map_err(|e| ProvisionError::Task(e.to_string()))??;

        debug!(
            "Account #{}: registration PoW took {:?} ({} candidates)",
            account.index(),
            start.elapsed(),
            candidates
        );
        if log::log_enabled!(log::Level::Trace) {
            trace!("Account #{} registration transaction {}", account.index(), tx.hash());
        }
        Ok(tx)
    }
}
