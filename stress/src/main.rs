use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tos_stress::{
    config::{ContractConfig, ContractTarget, FileConfig, RunConfig, StressConfig},
    daemon_api::{Devnet, DevnetConfig, RpcDaemonClient, SharedDaemonApi},
    logger::{init_logger, LogConfig},
    shutdown::spawn_signal_listener,
    wallet::{SoftwareWalletProvider, WalletProvider},
    StressError, WorkerPool,
};

/// TOS stress CLI configuration
#[derive(Parser, Clone, Debug)]
#[command(name = "tos-stress")]
#[command(about = "TOS Network stress testing tool", version)]
pub struct CliConfig {
    #[clap(flatten)]
    stress: StressConfig,

    #[clap(flatten)]
    log: LogConfig,

    /// Generate an example SC configuration at this path
    #[clap(long)]
    generate_example_sc_config: Option<String>,

    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,
}

// Connect to the daemon, or start a simulated network stopped by `devnet_stop`
fn build_daemon(
    stress: &StressConfig,
    config: &RunConfig,
    wallets: &dyn WalletProvider,
    devnet_stop: &CancellationToken,
) -> Result<(SharedDaemonApi, Option<JoinHandle<()>>), StressError> {
    if !stress.devnet {
        let client = RpcDaemonClient::new(&stress.daemon_address)?;
        client.check_wallets(wallets)?;
        info!("Daemon address: {}", client.url());
        return Ok((Arc::new(client), None));
    }

    let mut devnet = Devnet::new(DevnetConfig {
        block_time: Duration::from_millis(stress.devnet_block_time_ms),
        reject_all: false,
    });
    if let Some(ContractTarget::Existing(id)) = config.contract.as_ref().map(|c| &c.target) {
        devnet = devnet.with_contract(id.clone());
    }

    warn!(
        "Running against a simulated network with a block every {}ms",
        stress.devnet_block_time_ms
    );
    let devnet = Arc::new(devnet);
    let producer = devnet.spawn_block_producer(devnet_stop.clone());
    Ok((devnet, Some(producer)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    if let Some(path) = cli_config.generate_example_sc_config.as_ref() {
        ContractConfig::write_template(path)?;
        println!("SC configuration example generated at {path}");
        return Ok(());
    }

    // Handle config template generation
    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            FileConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            println!("Edit the file and run the application with --config-file {path}");
            return Ok(());
        }
    }

    let (stress, log) = match &cli_config.config_file {
        Some(path) => {
            let file = FileConfig::from_file(path)?;
            (file.stress, file.log)
        }
        None => (cli_config.stress, cli_config.log),
    };

    init_logger(&log)?;
    info!("TOS Stress v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = stress.to_run_config()?;
    config.log_summary();

    let wallets: Arc<dyn WalletProvider> = Arc::new(SoftwareWalletProvider);
    let devnet_stop = CancellationToken::new();
    let (daemon, producer) = build_daemon(&stress, &config, wallets.as_ref(), &devnet_stop)?;

    let cancel = CancellationToken::new();
    let listener = spawn_signal_listener(cancel.clone());

    let pool = WorkerPool::new(
        Arc::new(config),
        daemon,
        wallets,
        cancel,
    );
    let report = pool.run().await;
    report.print();

    listener.abort();
    devnet_stop.cancel();
    if let Some(producer) = producer {
        let _ = producer.await;
    }

    if !report.is_success() {
        return Err(StressError::WorkersFailed(report.failures.len()).into());
    }

    Ok(())
}
