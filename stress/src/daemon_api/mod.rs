pub mod devnet;
pub mod rpc;
#[cfg(test)]
pub mod flaky;

use crate::{
    crypto::{Address, Hash},
    transaction::Transaction,
    wallet::WireFormat,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use devnet::{Devnet, DevnetConfig};
pub use rpc::{RpcDaemonClient, RpcDaemonClientConfig};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("transaction {0} rejected: {1}")]
    Rejected(Hash, String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("a TOS daemon can't decode {0} transactions, use --devnet or a native wallet backend")]
    UnsupportedWireFormat(WireFormat),
}

// Inclusion state of a transaction as reported by the daemon
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionStatus {
    pub hash: Hash,
    pub topoheight: Option<u64>,
    pub block_hash: Option<Hash>,
}

impl TransactionStatus {
    pub fn not_found(hash: Hash) -> Self {
        Self {
            hash,
            topoheight: None,
            block_hash: None,
        }
    }

    pub fn is_included(&self) -> bool {
        self.block_hash.is_some()
    }
}

// Everything the stress engine needs from the network
#[async_trait]
pub trait DaemonApi: Send + Sync {
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<(), DaemonError>;

    async fn get_topoheight(&self) -> Result<u64, DaemonError>;

    // One status per requested hash, in the same order
    async fn get_transactions(&self, hashes: &[Hash]) -> Result<Vec<TransactionStatus>, DaemonError>;

    // Topoheight at which the account got registered, None if not registered yet
    async fn get_registration_topoheight(&self, address: &Address) -> Result<Option<u64>, DaemonError>;
}

pub type SharedDaemonApi = Arc<dyn DaemonApi>;
