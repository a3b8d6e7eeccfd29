use crate::crypto::{hash, Address, Hash};
use serde::{Deserialize, Serialize};

// Reserved argument names understood by the contract runtime
pub const SC_ACTION: &str = "SC_ACTION";
pub const SC_ID: &str = "SC_ID";
pub const SC_CODE: &str = "SC_CODE";
pub const SC_ENTRYPOINT: &str = "entrypoint";

// Values of the SC_ACTION argument
pub const SC_CALL: u64 = 0;
pub const SC_INSTALL: u64 = 1;

// Ring size used by the contract deployment transaction
pub const DEPLOY_RING_SIZE: u64 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "datatype", content = "value")]
pub enum ArgumentValue {
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "U")]
    Uint64(u64),
    #[serde(rename = "H")]
    Hash(Hash),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractArgument {
    pub name: String,
    pub value: ArgumentValue,
}

impl ContractArgument {
    pub fn new<S: Into<String>>(name: S, value: ArgumentValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// Find the contract targeted by a set of call arguments
pub fn contract_id(arguments: &[ContractArgument]) -> Option<&Hash> {
    arguments.iter().find_map(|arg| match &arg.value {
        ArgumentValue::Hash(h) if arg.name == SC_ID => Some(h),
        _ => None,
    })
}

// What a transaction should carry, given to the wallet to build and sign
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Transfer { destination: Address, amount: u64 },
    Empty,
    Invoke { arguments: Vec<ContractArgument> },
    Deploy { arguments: Vec<ContractArgument> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub ring_size: u64,
    pub payload: Payload,
}

impl TransactionRequest {
    pub fn new(ring_size: u64, payload: Payload) -> Self {
        Self { ring_size, payload }
    }

    // Install `code` as a new contract
    pub fn deploy(code: String) -> Self {
        let arguments = vec![
            ContractArgument::new(SC_ACTION, ArgumentValue::Uint64(SC_INSTALL)),
            ContractArgument::new(SC_CODE, ArgumentValue::String(code)),
        ];
        Self::new(DEPLOY_RING_SIZE, Payload::Deploy { arguments })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionKind {
    Registration,
    Transfer,
    Empty,
    Deploy,
    Invoke { contract: Hash },
}

impl TransactionKind {
    pub fn of(payload: &Payload) -> Self {
        match payload {
            Payload::Transfer { .. } => TransactionKind::Transfer,
            Payload::Empty => TransactionKind::Empty,
            Payload::Deploy { .. } => TransactionKind::Deploy,
            Payload::Invoke { arguments } => TransactionKind::Invoke {
                contract: contract_id(arguments).cloned().unwrap_or_else(Hash::zero),
            },
        }
    }
}

// A signed and encoded transaction, ready to be relayed.
// The encoding itself is owned by the wallet backend.
#[derive(Clone, Debug)]
pub struct Transaction {
    hash: Hash,
    source: Address,
    kind: TransactionKind,
    data: Vec<u8>,
}

impl Transaction {
    pub fn new(source: Address, kind: TransactionKind, data: Vec<u8>) -> Self {
        Self {
            hash: hash(&data),
            source,
            kind,
            data,
        }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}
