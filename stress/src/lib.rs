pub mod barrier;
pub mod config;
pub mod confirmation;
pub mod contract;
pub mod crypto;
pub mod daemon_api;
pub mod error;
pub mod generator;
pub mod logger;
pub mod pool;
pub mod provisioner;
pub mod shutdown;
pub mod stats;
pub mod storage;
pub mod submitter;
pub mod transaction;
pub mod wallet;
pub mod worker;

pub use error::StressError;
pub use pool::{RunReport, WorkerPool};
