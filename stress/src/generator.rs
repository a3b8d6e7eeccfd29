use crate::{
    config::{ContractDescriptor, RunConfig},
    crypto::{Address, Hash},
    transaction::{ContractArgument, Payload, Transaction, TransactionRequest},
    wallet::{Wallet, WalletError},
};

// What the generated transactions carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadPolicy {
    Transfer { destination: Address, amount: u64 },
    Empty,
    ContractCall { arguments: Vec<ContractArgument> },
}

impl PayloadPolicy {
    // A contract call wins over an empty transaction, which wins over a transfer
    pub fn select(config: &RunConfig, contract: Option<(&ContractDescriptor, &Hash)>) -> Self {
        if let Some((descriptor, id)) = contract {
            PayloadPolicy::ContractCall {
                arguments: descriptor.call_arguments(id),
            }
        } else if config.empty_tx {
            PayloadPolicy::Empty
        } else {
            PayloadPolicy::Transfer {
                destination: config.main_address.clone(),
                amount: config.amount,
            }
        }
    }

    fn payload(&self) -> Payload {
        match self {
            PayloadPolicy::Transfer {
                destination,
                amount,
            } => Payload::Transfer {
                destination: destination.clone(),
                amount: *amount,
            },
            PayloadPolicy::Empty => Payload::Empty,
            PayloadPolicy::ContractCall { arguments } => Payload::Invoke {
                arguments: arguments.clone(),
            },
        }
    }
}

pub struct TransactionGenerator {
    ring_size: u64,
    policy: PayloadPolicy,
}

impl TransactionGenerator {
    pub fn new(ring_size: u64, policy: PayloadPolicy) -> Self {
        Self { ring_size, policy }
    }

    pub fn policy(&self) -> &PayloadPolicy {
        &self.policy
    }

    // Build a new transaction from `wallet`, nothing is shared between two calls
    pub fn generate(&self, wallet: &dyn Wallet) -> Result<Transaction, WalletError> {
        let request = TransactionRequest::new(self.ring_size, self.policy.payload());
        wallet.build_transaction(&request)
    }
}
