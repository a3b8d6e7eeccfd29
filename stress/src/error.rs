use crate::{config::ConfigError, daemon_api::DaemonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StressError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    #[error("{0} worker(s) failed")]
    WorkersFailed(usize),
}
