pub mod software;

use crate::{
    crypto::Address,
    transaction::{Transaction, TransactionRequest},
};
use std::{fmt, sync::Arc};
use thiserror::Error;

pub use software::{SoftwareWallet, SoftwareWalletProvider};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid wallet data: {0}")]
    InvalidData(String),
    #[error("unsupported wallet version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid ring size {0}")]
    InvalidRingSize(u64),
    #[error("error while signing transaction: {0}")]
    Signing(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

// A wallet owned by a single stress account.
// Building must not mutate the wallet: two builds of the same request
// are independent transactions.
pub trait Wallet: Send + Sync {
    fn address(&self) -> &Address;

    // Build a new registration candidate, each call produces a different proof
    fn registration_transaction(&self) -> Result<Transaction, WalletError>;

    // Build and sign a transaction
    fn build_transaction(&self, request: &TransactionRequest) -> Result<Transaction, WalletError>;

    // Export the wallet as an opaque single line blob
    fn export(&self) -> Result<Vec<u8>, WalletError>;
}

pub type SharedWallet = Arc<dyn Wallet>;

// Encoding of the transactions built by a wallet backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    // Binary transactions decoded by TOS daemons
    Native,
    // Signed JSON envelopes, only understood by the simulated network
    Envelope,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Native => write!(f, "native"),
            WireFormat::Envelope => write!(f, "envelope"),
        }
    }
}

pub trait WalletProvider: Send + Sync {
    fn wire_format(&self) -> WireFormat;

    // Create a new random wallet
    fn create(&self) -> Result<SharedWallet, WalletError>;

    // Restore a wallet from a blob previously returned by `Wallet::export`
    fn open(&self, data: &[u8]) -> Result<SharedWallet, WalletError>;
}
