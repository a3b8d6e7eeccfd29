use super::{SharedWallet, Wallet, WalletError, WalletProvider, WireFormat};
use crate::{
    crypto::{Address, HASH_SIZE},
    transaction::{Payload, Transaction, TransactionKind, TransactionRequest},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const WALLET_VERSION: u8 = 1;
const TX_VERSION: u8 = 0;

#[derive(Serialize, Deserialize)]
struct WalletBlob {
    version: u8,
    secret: String,
}

#[derive(Serialize)]
struct Body<'a> {
    version: u8,
    source: &'a Address,
    public_key: String,
    ring_size: u64,
    // Fresh randomness for each build, this is what makes each
    // registration candidate and each rebuild a distinct transaction
    salt: u64,
    // None for a registration
    payload: Option<&'a Payload>,
}

#[derive(Serialize)]
struct Signed<'a> {
    body: Body<'a>,
    signature: String,
}

// Software wallet holding a single secret key in memory
pub struct SoftwareWallet {
    secret: [u8; HASH_SIZE],
    public_key: [u8; HASH_SIZE],
    address: Address,
}

impl SoftwareWallet {
    pub fn random() -> Self {
        Self::from_secret(rand::random())
    }

    pub fn from_secret(secret: [u8; HASH_SIZE]) -> Self {
        let public_key: [u8; HASH_SIZE] = blake3::hash(&secret).into();
        let address = Address::from_public_key(&public_key);
        Self {
            secret,
            public_key,
            address,
        }
    }

    fn encode(
        &self,
        ring_size: u64,
        payload: Option<&Payload>,
    ) -> Result<Vec<u8>, WalletError> {
        let body = Body {
            version: TX_VERSION,
            source: &self.address,
            public_key: hex::encode(self.public_key),
            ring_size,
            salt: rand::random(),
            payload,
        };

        let body_bytes =
            serde_json::to_vec(&body).map_err(|e| WalletError::Signing(e.to_string()))?;
        let signature = blake3::keyed_hash(&self.secret, &body_bytes);

        serde_json::to_vec(&Signed {
            body,
            signature: signature.to_hex().to_string(),
        })
        .map_err(|e| WalletError::Signing(e.to_string()))
    }
}

impl Wallet for SoftwareWallet {
    fn address(&self) -> &Address {
        &self.address
    }

    fn registration_transaction(&self) -> Result<Transaction, WalletError> {
        let data = self.encode(0, None)?;
        Ok(Transaction::new(
            self.address.clone(),
            TransactionKind::Registration,
            data,
        ))
    }

    fn build_transaction(&self, request: &TransactionRequest) -> Result<Transaction, WalletError> {
        if request.ring_size == 0 || !request.ring_size.is_power_of_two() {
            return Err(WalletError::InvalidRingSize(request.ring_size));
        }

        let data = self.encode(request.ring_size, Some(&request.payload))?;
        Ok(Transaction::new(
            self.address.clone(),
            TransactionKind::of(&request.payload),
            data,
        ))
    }

    fn export(&self) -> Result<Vec<u8>, WalletError> {
        let blob = WalletBlob {
            version: WALLET_VERSION,
            secret: hex::encode(self.secret),
        };
        serde_json::to_vec(&blob).map_err(|e| WalletError::InvalidData(e.to_string()))
    }
}

#[derive(Default, Clone, Copy)]
pub struct SoftwareWalletProvider;

impl WalletProvider for SoftwareWalletProvider {
    fn wire_format(&self) -> WireFormat {
        WireFormat::Envelope
    }

    fn create(&self) -> Result<SharedWallet, WalletError> {
        Ok(Arc::new(SoftwareWallet::random()))
    }

    fn open(&self, data: &[u8]) -> Result<SharedWallet, WalletError> {
        let blob: WalletBlob =
            serde_json::from_slice(data).map_err(|e| WalletError::InvalidData(e.to_string()))?;
        if blob.version != WALLET_VERSION {
            return Err(WalletError::UnsupportedVersion(blob.version));
        }

        let bytes = hex::decode(&blob.secret).map_err(|e| WalletError::InvalidData(e.to_string()))?;
        let secret: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| WalletError::InvalidData("invalid secret length".into()))?;

        Ok(Arc::new(SoftwareWallet::from_secret(secret)))
    }
}
