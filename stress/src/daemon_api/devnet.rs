//! In-process simulated network.
//!
//! Keeps a mempool and a chain of blocks, produced either manually with
//! [`Devnet::mine_block`] or periodically by [`Devnet::spawn_block_producer`].
//! It enforces the rules the stress engine depends on: an account must be
//! registered before sending anything else, a transaction hash is accepted
//! only once, and contract calls must target a deployed contract.

use super::{DaemonApi, DaemonError, TransactionStatus};
use crate::{
    crypto::{hash, Address, Hash},
    transaction::{Transaction, TransactionKind},
};
use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, trace};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct DevnetConfig {
    // Interval between two blocks when the block producer is running
    pub block_time: Duration,
    // Reject every submission, used to simulate a node refusing traffic
    pub reject_all: bool,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            block_time: Duration::from_secs(1),
            reject_all: false,
        }
    }
}

#[derive(Default)]
struct State {
    topoheight: u64,
    mempool: IndexMap<Hash, Transaction>,
    // tx hash -> (topoheight, block hash)
    included: HashMap<Hash, (u64, Hash)>,
    registrations: HashMap<Address, u64>,
    contracts: HashSet<Hash>,
    // every accepted transaction, in acceptance order
    accepted: Vec<Transaction>,
    rejected: usize,
}

pub struct Devnet {
    config: DevnetConfig,
    state: Mutex<State>,
}

impl Devnet {
    pub fn new(config: DevnetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    // Make a contract callable without deploying it first
    pub fn with_contract(self, contract: Hash) -> Self {
        self.state.lock().contracts.insert(contract);
        self
    }

    // Include every transaction of the mempool in a new block
    pub fn mine_block(&self) -> u64 {
        let mut state = self.state.lock();
        state.topoheight += 1;
        let topoheight = state.topoheight;

        let txs: Vec<Transaction> = state.mempool.drain(..).map(|(_, tx)| tx).collect();
        let mut header = topoheight.to_le_bytes().to_vec();
        for tx in &txs {
            header.extend_from_slice(tx.hash().as_bytes());
        }
        let block_hash = hash(&header);

        for tx in &txs {
            match tx.kind() {
                TransactionKind::Registration => {
                    state
                        .registrations
                        .entry(tx.source().clone())
                        .or_insert(topoheight);
                }
                TransactionKind::Deploy => {
                    state.contracts.insert(tx.hash().clone());
                }
                _ => {}
            }
            state
                .included
                .insert(tx.hash().clone(), (topoheight, block_hash.clone()));
        }

        if log::log_enabled!(log::Level::Trace) {
            trace!("devnet block {} at topoheight {} with {} txs", block_hash, topoheight, txs.len());
        }
        topoheight
    }

    // Produce a block every `block_time` until cancelled
    pub fn spawn_block_producer(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let zelf = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(zelf.config.block_time);
            // first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        zelf.mine_block();
                    }
                }
            }
            debug!("devnet block producer stopped");
        })
    }

    pub fn topoheight(&self) -> u64 {
        self.state.lock().topoheight
    }

    pub fn accepted_transactions(&self) -> Vec<Transaction> {
        self.state.lock().accepted.clone()
    }

    pub fn count_accepted(&self, filter: impl Fn(&TransactionKind) -> bool) -> usize {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|tx| filter(tx.kind()))
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.state.lock().rejected
    }

    pub fn registered_accounts(&self) -> usize {
        self.state.lock().registrations.len()
    }

    fn verify(state: &State, tx: &Transaction) -> Result<(), String> {
        if state.mempool.contains_key(tx.hash()) {
            return Err("transaction already in mempool".into());
        }

        if state.included.contains_key(tx.hash()) {
            return Err("transaction already in chain".into());
        }

        let registered = state.registrations.contains_key(tx.source());
        match tx.kind() {
            TransactionKind::Registration => {
                if registered {
                    return Err("account already registered".into());
                }
                let pending = state.mempool.values().any(|pending| {
                    pending.source() == tx.source()
                        && *pending.kind() == TransactionKind::Registration
                });
                if pending {
                    return Err("registration already pending".into());
                }
            }
            TransactionKind::Invoke { contract } => {
                if !registered {
                    return Err("account not registered".into());
                }
                if !state.contracts.contains(contract) {
                    return Err(format!("contract {} not found", contract));
                }
            }
            _ => {
                if !registered {
                    return Err("account not registered".into());
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DaemonApi for Devnet {
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<(), DaemonError> {
        let mut state = self.state.lock();
        let verified = if self.config.reject_all {
            Err("node refuses transactions".to_string())
        } else {
            Self::verify(&state, transaction)
        };

        match verified {
            Ok(()) => {
                state
                    .mempool
                    .insert(transaction.hash().clone(), transaction.clone());
                state.accepted.push(transaction.clone());
                Ok(())
            }
            Err(reason) => {
                state.rejected += 1;
                Err(DaemonError::Rejected(transaction.hash().clone(), reason))
            }
        }
    }

    async fn get_topoheight(&self) -> Result<u64, DaemonError> {
        Ok(self.topoheight())
    }

    async fn get_transactions(&self, hashes: &[Hash]) -> Result<Vec<TransactionStatus>, DaemonError> {
        let state = self.state.lock();
        Ok(hashes
            .iter()
            .map(|h| match state.included.get(h) {
                Some((topoheight, block)) => TransactionStatus {
                    hash: h.clone(),
                    topoheight: Some(*topoheight),
                    block_hash: Some(block.clone()),
                },
                None => TransactionStatus::not_found(h.clone()),
            })
            .collect())
    }

    async fn get_registration_topoheight(&self, address: &Address) -> Result<Option<u64>, DaemonError> {
        Ok(self.state.lock().registrations.get(address).copied())
    }
}
