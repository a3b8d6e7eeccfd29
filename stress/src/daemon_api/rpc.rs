use super::{DaemonApi, DaemonError, TransactionStatus};
use crate::{
    crypto::{Address, Hash},
    transaction::Transaction,
    wallet::{WalletProvider, WireFormat},
};
use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use url::Url;

/// Timeouts used by the JSON-RPC client
#[derive(Debug, Clone)]
pub struct RpcDaemonClientConfig {
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for RpcDaemonClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<P>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Serialize)]
struct SubmitTransactionParams {
    data: String,
}

#[derive(Serialize)]
struct GetTransactionsParams<'a> {
    tx_hashes: Cow<'a, [Hash]>,
}

#[derive(Serialize)]
struct GetBlockByHashParams<'a> {
    hash: Cow<'a, Hash>,
}

#[derive(Serialize)]
struct AccountParams<'a> {
    address: Cow<'a, Address>,
}

#[derive(Serialize)]
struct IsAccountRegisteredParams<'a> {
    address: Cow<'a, Address>,
    in_stable_height: bool,
}

#[derive(Deserialize)]
struct TransactionEntry {
    hash: Hash,
    #[serde(default)]
    executed_in_block: Option<Hash>,
}

#[derive(Deserialize)]
struct BlockEntry {
    #[serde(default)]
    topoheight: Option<u64>,
}

/// JSON-RPC client for a TOS daemon
pub struct RpcDaemonClient {
    client: Client,
    url: Url,
    request_id: AtomicU64,
}

impl RpcDaemonClient {
    pub fn new(daemon_address: &str) -> Result<Self, DaemonError> {
        Self::with_config(daemon_address, RpcDaemonClientConfig::default())
    }

    pub fn with_config(
        daemon_address: &str,
        config: RpcDaemonClientConfig,
    ) -> Result<Self, DaemonError> {
        let base_url = if daemon_address.starts_with("http://")
            || daemon_address.starts_with("https://")
        {
            Url::parse(daemon_address)
        } else {
            Url::parse(&format!("http://{}", daemon_address))
        }
        .map_err(|e| DaemonError::Transport(format!("invalid daemon address: {e}")))?;

        let url = base_url
            .join("json_rpc")
            .map_err(|e| DaemonError::Transport(format!("invalid daemon address: {e}")))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .build()
            .map_err(|e| DaemonError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    // Refuse wallet backends whose transactions the daemon can't decode
    pub fn check_wallets(&self, wallets: &dyn WalletProvider) -> Result<(), DaemonError> {
        match wallets.wire_format() {
            WireFormat::Native => Ok(()),
            format => Err(DaemonError::UnsupportedWireFormat(format)),
        }
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<T, DaemonError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("call: {}", method);
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DaemonError::Transport(format!("request timeout on {method}"))
                } else {
                    DaemonError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(DaemonError::Transport(format!(
                "HTTP error {}",
                response.status().as_u16()
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| DaemonError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(DaemonError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| DaemonError::InvalidResponse(format!("no result for {method}")))
    }

    async fn get_block_topoheight(&self, hash: &Hash) -> Result<Option<u64>, DaemonError> {
        let block: BlockEntry = self
            .call(
                "get_block_by_hash",
                Some(GetBlockByHashParams {
                    hash: Cow::Borrowed(hash),
                }),
            )
            .await?;
        Ok(block.topoheight)
    }
}

#[async_trait]
impl DaemonApi for RpcDaemonClient {
    async fn submit_transaction(&self, transaction: &Transaction) -> Result<(), DaemonError> {
        let accepted: bool = self
            .call(
                "submit_transaction",
                Some(SubmitTransactionParams {
                    data: transaction.to_hex(),
                }),
            )
            .await?;

        if !accepted {
            return Err(DaemonError::Rejected(
                transaction.hash().clone(),
                "not accepted by daemon".into(),
            ));
        }
        Ok(())
    }

    async fn get_topoheight(&self) -> Result<u64, DaemonError> {
        self.call::<Value, u64>("get_topoheight", None).await
    }

    async fn get_transactions(&self, hashes: &[Hash]) -> Result<Vec<TransactionStatus>, DaemonError> {
        let entries: Vec<Option<TransactionEntry>> = self
            .call(
                "get_transactions",
                Some(GetTransactionsParams {
                    tx_hashes: Cow::Borrowed(hashes),
                }),
            )
            .await?;

        if entries.len() != hashes.len() {
            return Err(DaemonError::InvalidResponse(format!(
                "expected {} transactions, got {}",
                hashes.len(),
                entries.len()
            )));
        }

        // Several transactions usually share the same block
        let mut topoheights: HashMap<Hash, Option<u64>> = HashMap::new();
        let mut statuses = Vec::with_capacity(hashes.len());
        for (hash, entry) in hashes.iter().zip(entries) {
            let Some(entry) = entry else {
                statuses.push(TransactionStatus::not_found(hash.clone()));
                continue;
            };

            let topoheight = match &entry.executed_in_block {
                Some(block) => match topoheights.get(block) {
                    Some(topoheight) => *topoheight,
                    None => {
                        let topoheight = self.get_block_topoheight(block).await?;
                        topoheights.insert(block.clone(), topoheight);
                        topoheight
                    }
                },
                None => None,
            };

            statuses.push(TransactionStatus {
                hash: entry.hash,
                topoheight,
                block_hash: entry.executed_in_block,
            });
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "fetched {} transactions across {} blocks",
                statuses.len(),
                topoheights.len()
            );
        }
        Ok(statuses)
    }

    async fn get_registration_topoheight(&self, address: &Address) -> Result<Option<u64>, DaemonError> {
        let registered: bool = self
            .call(
                "is_account_registered",
                Some(IsAccountRegisteredParams {
                    address: Cow::Borrowed(address),
                    in_stable_height: false,
                }),
            )
            .await?;

        if !registered {
            return Ok(None);
        }

        let topoheight: u64 = self
            .call(
                "get_account_registration_topoheight",
                Some(AccountParams {
                    address: Cow::Borrowed(address),
                }),
            )
            .await?;
        Ok(Some(topoheight))
    }
}
