use crate::{
    crypto::{Address, AddressError, Hash, HASH_SIZE},
    logger::LogConfig,
    transaction::{ArgumentValue, ContractArgument, SC_ACTION, SC_CALL, SC_ENTRYPOINT, SC_ID},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Default values for configuration
pub mod defaults {
    pub const TOTAL_ACCOUNTS: usize = 100;
    pub const RING_SIZE: u64 = 4;
    pub const AMOUNT: u64 = 1;
    pub const ROUNDS: usize = 1;
    pub const REPEAT_TX: usize = 1;
    pub const WAIT_N_BLOCKS: u64 = 1;
    // blocks to wait once all accounts of a worker are registered
    pub const SETTLE_BLOCKS: u64 = 5;
    pub const WALLETS_DIR: &str = "wallets/";
    pub const DAEMON_ADDRESS: &str = "http://127.0.0.1:8080";
    pub const DEVNET_BLOCK_TIME_MS: u64 = 1000;

    // Polling intervals
    pub const REGISTRATION_POLL_MS: u64 = 1000;
    pub const DEPLOYMENT_POLL_MS: u64 = 2000;
    pub const CONFIRMATION_POLL_MS: u64 = 2000;
    pub const BLOCK_POLL_MS: u64 = 1000;
    pub const SHUTDOWN_GRACE_SECS: u64 = 10;

    // Code shorter than this and containing a dot is a file path
    pub const CONTRACT_PATH_MAX_LENGTH: usize = 16;

    // Half of the available parallelism, at least one
    pub fn threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("minimum number of threads is 1")]
    InvalidThreads,
    #[error("ring size {0} isn't a power of 2")]
    InvalidRingSize(u64),
    #[error("invalid amount {0}, must be greater than 0")]
    InvalidAmount(u64),
    #[error("invalid wait-n-blocks {0}, must be greater than 0")]
    InvalidWaitBlocks(u64),
    #[error("minimum number of repeat TX is 1")]
    InvalidRepeat,
    #[error("minimum number of rounds is 1")]
    InvalidRounds,
    #[error("invalid mode {0}, expected 0, 1 or 2")]
    InvalidMode(u8),
    #[error("invalid address '{0}': {1}")]
    InvalidAddress(String, AddressError),
    #[error("you can't deploy a SC and specify a SCID in the same configuration")]
    DeployWithContractId,
    #[error("you want to deploy a SC but no code or filename is provided")]
    MissingContractCode,
    #[error("invalid SCID '{0}' in SC configuration")]
    InvalidContractId(String),
    #[error("error while reading '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error while parsing '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StressMode {
    // wait on all workers to send all pre-generated transactions at the same time
    #[default]
    OneTime,
    // send each transaction as soon as it is created
    OnCreation,
    // send each transaction as soon as it is created, for several rounds
    Spam,
}

impl TryFrom<u8> for StressMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StressMode::OneTime),
            1 => Ok(StressMode::OnCreation),
            2 => Ok(StressMode::Spam),
            _ => Err(ConfigError::InvalidMode(value)),
        }
    }
}

impl From<StressMode> for u8 {
    fn from(value: StressMode) -> Self {
        match value {
            StressMode::OneTime => 0,
            StressMode::OnCreation => 1,
            StressMode::Spam => 2,
        }
    }
}

impl fmt::Display for StressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StressMode::OneTime => "One Time",
            StressMode::OnCreation => "On Creation",
            StressMode::Spam => "Spam",
        };
        f.write_str(name)
    }
}

/// Smart contract configuration file, as written by users
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContractConfig {
    #[serde(rename = "deploySC", default)]
    pub deploy_sc: bool,
    #[serde(rename = "scCode", default)]
    pub sc_code: String,
    // not used when deploy_sc is set
    #[serde(default)]
    pub scid: String,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default)]
    pub arguments: Vec<ContractArgument>,
}

impl ContractConfig {
    pub fn example() -> Self {
        Self {
            deploy_sc: false,
            sc_code: String::new(),
            scid: format!("{}01", "0".repeat(HASH_SIZE * 2 - 2)),
            entry_point: "Register".into(),
            arguments: vec![ContractArgument::new(
                "name",
                ArgumentValue::String("stress".into()),
            )],
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_template<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&Self::example())?;
        fs::write(path, content)?;
        Ok(())
    }

    // Validate the configuration, loading the contract code from disk when
    // it references a file. Relative paths are resolved from `base_dir`.
    pub fn resolve(self, base_dir: &Path) -> Result<ContractDescriptor, ConfigError> {
        let target = if self.deploy_sc {
            if !self.scid.is_empty() {
                return Err(ConfigError::DeployWithContractId);
            }

            if self.sc_code.is_empty() {
                return Err(ConfigError::MissingContractCode);
            }

            let code = if self.sc_code.len() < defaults::CONTRACT_PATH_MAX_LENGTH
                && self.sc_code.contains('.')
            {
                let path = base_dir.join(&self.sc_code);
                fs::read_to_string(&path).map_err(|source| ConfigError::File { path, source })?
            } else {
                self.sc_code
            };

            ContractTarget::Deploy { code }
        } else {
            let id: Hash = self
                .scid
                .parse()
                .map_err(|_| ConfigError::InvalidContractId(self.scid.clone()))?;
            ContractTarget::Existing(id)
        };

        Ok(ContractDescriptor {
            target,
            entry_point: self.entry_point,
            arguments: self.arguments,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractTarget {
    // Deploy this code once, then call the deployed contract
    Deploy { code: String },
    // Call an already deployed contract
    Existing(Hash),
}

/// Validated contract descriptor used by the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescriptor {
    pub target: ContractTarget,
    pub entry_point: String,
    pub arguments: Vec<ContractArgument>,
}

impl ContractDescriptor {
    pub fn requires_deployment(&self) -> bool {
        matches!(self.target, ContractTarget::Deploy { .. })
    }

    // Arguments of a call to the contract `contract`
    pub fn call_arguments(&self, contract: &Hash) -> Vec<ContractArgument> {
        let mut arguments = self.arguments.clone();
        if !self.entry_point.is_empty() {
            arguments.push(ContractArgument::new(
                SC_ENTRYPOINT,
                ArgumentValue::String(self.entry_point.clone()),
            ));
        }
        arguments.push(ContractArgument::new(SC_ACTION, ArgumentValue::Uint64(SC_CALL)));
        arguments.push(ContractArgument::new(SC_ID, ArgumentValue::Hash(contract.clone())));
        arguments
    }
}

/// Polling intervals and deadlines of a run
#[derive(Debug, Clone)]
pub struct Timings {
    pub registration_poll: Duration,
    pub deployment_poll: Duration,
    pub confirmation_poll: Duration,
    // used while waiting for new blocks
    pub block_poll: Duration,
    // None keeps workers blocked at a barrier until the run is cancelled
    pub barrier_timeout: Option<Duration>,
    // time given to workers to unwind after a cancellation
    pub shutdown_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            registration_poll: Duration::from_millis(defaults::REGISTRATION_POLL_MS),
            deployment_poll: Duration::from_millis(defaults::DEPLOYMENT_POLL_MS),
            confirmation_poll: Duration::from_millis(defaults::CONFIRMATION_POLL_MS),
            block_poll: Duration::from_millis(defaults::BLOCK_POLL_MS),
            barrier_timeout: None,
            shutdown_grace: Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS),
        }
    }
}

/// Immutable configuration of a stress run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub threads: usize,
    pub accounts_per_thread: usize,
    pub ring_size: u64,
    pub amount: u64,
    pub mode: StressMode,
    pub rounds: usize,
    pub repeat_tx: usize,
    pub skip_pow: bool,
    pub empty_tx: bool,
    pub use_disk: bool,
    pub wallets_dir: PathBuf,
    pub registration_only: bool,
    pub main_address: Address,
    pub contract: Option<ContractDescriptor>,
    pub output: Option<PathBuf>,
    pub wait_n_blocks: u64,
    pub settle_blocks: u64,
    pub timings: Timings,
}

impl Default for RunConfig {
    fn default() -> Self {
        let threads = defaults::threads();
        Self {
            threads,
            accounts_per_thread: (defaults::TOTAL_ACCOUNTS / threads).max(1),
            ring_size: defaults::RING_SIZE,
            amount: defaults::AMOUNT,
            mode: StressMode::default(),
            rounds: defaults::ROUNDS,
            repeat_tx: defaults::REPEAT_TX,
            skip_pow: false,
            empty_tx: false,
            use_disk: false,
            wallets_dir: PathBuf::from(defaults::WALLETS_DIR),
            registration_only: false,
            main_address: burn_address(),
            contract: None,
            output: None,
            wait_n_blocks: defaults::WAIT_N_BLOCKS,
            settle_blocks: defaults::SETTLE_BLOCKS,
            timings: Timings::default(),
        }
    }
}

impl RunConfig {
    pub fn total_accounts(&self) -> usize {
        self.threads * self.accounts_per_thread
    }

    // Log the configuration of the run
    pub fn log_summary(&self) {
        info!("Receiver address: {}", self.main_address);
        info!("Threads: {}", self.threads);
        info!("Ring Size: {}", self.ring_size);
        info!("Generate accounts only: {}", self.registration_only);
        info!("Total TX to be generated: {}", self.total_accounts());
        info!("Load & save wallets on disk: {}", self.use_disk);
        info!("Selected mode: {}", self.mode);
        if self.mode == StressMode::Spam {
            info!("Rounds: {}", self.rounds);
        }
        info!("Amount transferred: {}", self.amount);
        if let Some(output) = &self.output {
            info!("Output: {}", output.display());
            info!("Will wait {} blocks before fetching txs from daemon", self.wait_n_blocks);
        }
        info!("Repeat TX: {}", self.repeat_tx);
        info!("Skip POW: {}", self.skip_pow);
        info!("Empty TX: {}", self.empty_tx);
        info!("Use SC Config: {}", self.contract.is_some());
    }
}

// Address of the all zero public key, receiver used when none is configured
pub fn burn_address() -> Address {
    Address::from_public_key(&[0u8; HASH_SIZE])
}

/// Stress run settings, from the command line or from a JSON file
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Number of threads used, half of the available parallelism by default
    #[clap(long)]
    pub threads: Option<usize>,
    /// Maximum of generated accounts and TXs sent at same time
    #[clap(long, default_value_t = defaults::TOTAL_ACCOUNTS)]
    pub total_accounts: usize,
    /// Ring size for each TX generated
    #[clap(long = "ringsize", default_value_t = defaults::RING_SIZE)]
    pub ring_size: u64,
    /// Amount transferred on each transaction
    #[clap(long = "amount-transferred", default_value_t = defaults::AMOUNT)]
    pub amount: u64,
    /// 0: wait & send in one time. 1: send at each tx created. 2: spam for several rounds
    #[clap(long, default_value_t = 0)]
    pub mode: u8,
    /// Used by spam mode. How many times the spam is repeated
    #[clap(long, default_value_t = defaults::ROUNDS)]
    pub rounds: usize,
    /// Send each TX N times to the node
    #[clap(long, default_value_t = defaults::REPEAT_TX)]
    pub repeat_tx: usize,
    /// Skip registration TX PoW
    #[clap(long)]
    pub skip_pow: bool,
    /// Send empty TXs
    #[clap(long)]
    pub empty_tx: bool,
    /// Load & save wallets on disk
    #[clap(long)]
    pub use_disk: bool,
    /// Directory of the wallets saved on disk
    #[clap(long, default_value_t = String::from(defaults::WALLETS_DIR))]
    pub wallets_dir: String,
    /// Send registration TXs only
    #[clap(long)]
    pub registration_only: bool,
    /// Receiver address of all the TXs
    #[clap(long)]
    pub main_address: Option<String>,
    /// Daemon address to use, requires a wallet backend building native TOS transactions
    #[clap(long, default_value_t = String::from(defaults::DAEMON_ADDRESS))]
    pub daemon_address: String,
    /// Use configuration to send SC TXs
    #[clap(long)]
    pub use_sc_config: Option<String>,
    /// Record all TXs sent to the daemon in this file
    #[clap(long)]
    pub output: Option<String>,
    /// Wait N blocks before fetching TXs for the output option
    #[clap(long, default_value_t = defaults::WAIT_N_BLOCKS)]
    pub wait_n_blocks: u64,
    /// Blocks to wait once all accounts of a thread are registered
    #[clap(long, default_value_t = defaults::SETTLE_BLOCKS)]
    pub settle_blocks: u64,
    /// Give up waiting for other threads at a barrier after this many seconds
    #[clap(long)]
    pub barrier_timeout_secs: Option<u64>,
    /// Run against an in-process simulated network instead of a daemon.
    /// Required with the built-in software wallet, whose transactions a TOS daemon can't decode
    #[clap(long)]
    pub devnet: bool,
    /// Block time of the simulated network in milliseconds
    #[clap(long, default_value_t = defaults::DEVNET_BLOCK_TIME_MS)]
    pub devnet_block_time_ms: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: None,
            total_accounts: defaults::TOTAL_ACCOUNTS,
            ring_size: defaults::RING_SIZE,
            amount: defaults::AMOUNT,
            mode: 0,
            rounds: defaults::ROUNDS,
            repeat_tx: defaults::REPEAT_TX,
            skip_pow: false,
            empty_tx: false,
            use_disk: false,
            wallets_dir: defaults::WALLETS_DIR.to_owned(),
            registration_only: false,
            main_address: None,
            daemon_address: defaults::DAEMON_ADDRESS.to_owned(),
            use_sc_config: None,
            output: None,
            wait_n_blocks: defaults::WAIT_N_BLOCKS,
            settle_blocks: defaults::SETTLE_BLOCKS,
            barrier_timeout_secs: None,
            devnet: false,
            devnet_block_time_ms: defaults::DEVNET_BLOCK_TIME_MS,
        }
    }
}

impl StressConfig {
    pub fn to_run_config(&self) -> Result<RunConfig, ConfigError> {
        let threads = self.threads.unwrap_or_else(defaults::threads);
        if threads < 1 {
            return Err(ConfigError::InvalidThreads);
        }

        if self.ring_size == 0 || !self.ring_size.is_power_of_two() {
            return Err(ConfigError::InvalidRingSize(self.ring_size));
        }

        if self.amount == 0 {
            return Err(ConfigError::InvalidAmount(self.amount));
        }

        if self.wait_n_blocks == 0 {
            return Err(ConfigError::InvalidWaitBlocks(self.wait_n_blocks));
        }

        if self.repeat_tx < 1 {
            return Err(ConfigError::InvalidRepeat);
        }

        if self.rounds < 1 {
            return Err(ConfigError::InvalidRounds);
        }

        let mode = StressMode::try_from(self.mode)?;

        let main_address = match &self.main_address {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidAddress(value.clone(), e))?,
            None => burn_address(),
        };

        let contract = match &self.use_sc_config {
            Some(path) => {
                let path = Path::new(path);
                let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
                Some(ContractConfig::from_file(path)?.resolve(base_dir)?)
            }
            None => None,
        };

        // at least one account per thread
        let total_accounts = self.total_accounts.max(threads);

        Ok(RunConfig {
            threads,
            accounts_per_thread: total_accounts / threads,
            ring_size: self.ring_size,
            amount: self.amount,
            mode,
            rounds: self.rounds,
            repeat_tx: self.repeat_tx,
            skip_pow: self.skip_pow,
            empty_tx: self.empty_tx,
            use_disk: self.use_disk,
            wallets_dir: PathBuf::from(&self.wallets_dir),
            registration_only: self.registration_only,
            main_address,
            contract,
            output: self.output.as_ref().map(PathBuf::from),
            wait_n_blocks: self.wait_n_blocks,
            settle_blocks: self.settle_blocks,
            timings: Timings {
                barrier_timeout: self.barrier_timeout_secs.map(Duration::from_secs),
                ..Timings::default()
            },
        })
    }
}

/// Content of the JSON file given with `--config-file`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(flatten)]
    pub stress: StressConfig,
    #[serde(flatten)]
    pub log: LogConfig,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&Self::default())?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> StressConfig {
        StressConfig {
            threads: Some(4),
            ..StressConfig::default()
        }
    }

    #[test]
    fn test_accounts_split_across_threads() {
        let run = StressConfig {
            total_accounts: 10,
            ..config()
        }
        .to_run_config()
        .unwrap();
        assert_eq!(run.accounts_per_thread, 2);
        assert_eq!(run.total_accounts(), 8);

        // raised to one account per thread
        let run = StressConfig {
            total_accounts: 1,
            ..config()
        }
        .to_run_config()
        .unwrap();
        assert_eq!(run.accounts_per_thread, 1);
    }

    #[test]
    fn test_validation_errors() {
        let invalid = [
            StressConfig { threads: Some(0), ..config() },
            StressConfig { ring_size: 6, ..config() },
            StressConfig { ring_size: 0, ..config() },
            StressConfig { amount: 0, ..config() },
            StressConfig { wait_n_blocks: 0, ..config() },
            StressConfig { repeat_tx: 0, ..config() },
            StressConfig { rounds: 0, ..config() },
            StressConfig { mode: 3, ..config() },
            StressConfig { main_address: Some("bad address".into()), ..config() },
        ];

        for stress in invalid {
            assert!(stress.to_run_config().is_err(), "{:?}", stress);
        }
    }

    #[test]
    fn test_mode_conversion() {
        assert_eq!(StressMode::try_from(2).unwrap(), StressMode::Spam);
        assert_eq!(u8::from(StressMode::OnCreation), 1);
        assert_eq!(StressMode::OneTime.to_string(), "One Time");
        assert_eq!(serde_json::to_string(&StressMode::Spam).unwrap(), "2");
    }

    #[test]
    fn test_contract_template_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sc.json");
        ContractConfig::write_template(&path).unwrap();

        let descriptor = ContractConfig::from_file(&path)
            .unwrap()
            .resolve(dir.path())
            .unwrap();
        assert!(!descriptor.requires_deployment());
        assert_eq!(descriptor.entry_point, "Register");
        match descriptor.target {
            ContractTarget::Existing(id) => assert_eq!(id.as_bytes()[HASH_SIZE - 1], 1),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_contract_rules() {
        let dir = tempdir().unwrap();

        let both = ContractConfig {
            deploy_sc: true,
            sc_code: "Function Initialize() Uint64".into(),
            scid: ContractConfig::example().scid,
            ..ContractConfig::default()
        };
        assert!(matches!(
            both.resolve(dir.path()),
            Err(ConfigError::DeployWithContractId)
        ));

        let no_code = ContractConfig {
            deploy_sc: true,
            ..ContractConfig::default()
        };
        assert!(matches!(
            no_code.resolve(dir.path()),
            Err(ConfigError::MissingContractCode)
        ));

        let bad_id = ContractConfig {
            scid: "1234".into(),
            ..ContractConfig::default()
        };
        assert!(matches!(
            bad_id.resolve(dir.path()),
            Err(ConfigError::InvalidContractId(_))
        ));
    }

    #[test]
    fn test_contract_code_loaded_from_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sc.bas"), "Function Initialize() Uint64").unwrap();

        let from_file = ContractConfig {
            deploy_sc: true,
            sc_code: "sc.bas".into(),
            ..ContractConfig::default()
        };
        let descriptor = from_file.resolve(dir.path()).unwrap();
        assert_eq!(
            descriptor.target,
            ContractTarget::Deploy {
                code: "Function Initialize() Uint64".into()
            }
        );

        let inline = ContractConfig {
            deploy_sc: true,
            sc_code: "Function Initialize() Uint64 10 RETURN 0 End Function".into(),
            ..ContractConfig::default()
        };
        assert!(inline.resolve(dir.path()).unwrap().requires_deployment());
    }

    #[test]
    fn test_call_arguments() {
        let descriptor = ContractConfig::example().resolve(Path::new(".")).unwrap();
        let id = crate::crypto::hash(b"sc");
        let arguments = descriptor.call_arguments(&id);

        assert_eq!(arguments.len(), 4);
        assert_eq!(crate::transaction::contract_id(&arguments), Some(&id));
        assert!(arguments
            .iter()
            .any(|a| a.name == SC_ENTRYPOINT && a.value == ArgumentValue::String("Register".into())));
    }

    #[test]
    fn test_stress_config_from_json_uses_defaults() {
        let stress: StressConfig = serde_json::from_str(r#"{ "threads": 2, "mode": 2 }"#).unwrap();
        let run = stress.to_run_config().unwrap();
        assert_eq!(run.threads, 2);
        assert_eq!(run.mode, StressMode::Spam);
        assert_eq!(run.accounts_per_thread, defaults::TOTAL_ACCOUNTS / 2);
        assert_eq!(run.ring_size, defaults::RING_SIZE);
    }

    #[test]
    fn test_file_config_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stress.json");
        FileConfig::generate_template(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"total_accounts\": 100"));
        assert!(content.contains("\"log_level\": \"info\""));

        let loaded = FileConfig::from_file(&path).unwrap();
        assert_eq!(loaded.stress.ring_size, defaults::RING_SIZE);
        assert!(!loaded.log.disable_file_logging);
    }
}
