//! Worker pool of a stress run.
//!
//! Spawns one task per worker, each owning a disjoint range of accounts,
//! and supervises them until they are all done. A worker failure cancels
//! the whole run. Once cancelled, workers get a grace period to unwind
//! before being aborted. Statistics are then collected and, when an output
//! file is configured, the submitted transactions are reconciled against
//! the chain.

use crate::{
    barrier::{Phase, PhaseBarriers},
    config::RunConfig,
    confirmation::{ConfirmationPoller, ReconciliationReport},
    contract::DeploymentGate,
    crypto::Hash,
    daemon_api::SharedDaemonApi,
    stats::{CounterSnapshot, RunStats},
    wallet::WalletProvider,
    worker::{Worker, WorkerContext, WorkerError, WorkerSummary},
};
use log::{error, info, warn};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    task::{Id, JoinSet},
    time::{timeout_at, Instant},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    // summaries of the workers that completed, ordered by worker id
    pub workers: Vec<WorkerSummary>,
    pub failures: Vec<String>,
    // workers stopped by the cancellation, or aborted after the grace period
    pub stopped: usize,
    pub interrupted: bool,
    pub registrations: CounterSnapshot,
    pub transactions: CounterSnapshot,
    pub barrier_releases: Vec<(Phase, usize)>,
    pub contract: Option<Hash>,
    pub reconciliation: Option<ReconciliationReport>,
    pub reconciliation_error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    // No worker failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn barrier_releases(&self, phase: Phase) -> usize {
        self.barrier_releases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, releases)| *releases)
            .unwrap_or(0)
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(70));
        println!("STRESS SUMMARY");
        println!("{}", "=".repeat(70));
        println!("Workers completed:            {}", self.workers.len());
        println!("Workers stopped:              {}", self.stopped);
        println!("Workers failed:               {}", self.failures.len());
        println!("Interrupted:                  {}", self.interrupted);
        println!("Registrations:                {}", self.registrations);
        println!("Transactions:                 {}", self.transactions);
        if let Some(contract) = &self.contract {
            println!("Contract:                     {}", contract);
        }
        println!("Total duration:               {:?}", self.elapsed);
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            println!(
                "Average TPS:                  {:.2}",
                self.transactions.sent as f64 / secs
            );
        }
        match (&self.reconciliation, &self.reconciliation_error) {
            (Some(report), _) => println!("TXs mined:                    {}/{}", report.mined, report.total),
            (None, Some(e)) => println!("Reconciliation failed:        {}", e),
            (None, None) => {}
        }
        for failure in &self.failures {
            println!("Failure: {}", failure);
        }
        println!("{}", "=".repeat(70));
    }
}

pub struct WorkerPool {
    config: Arc<RunConfig>,
    daemon: SharedDaemonApi,
    wallets: Arc<dyn WalletProvider>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        config: Arc<RunConfig>,
        daemon: SharedDaemonApi,
        wallets: Arc<dyn WalletProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            daemon,
            wallets,
            stats: Arc::new(RunStats::new()),
            cancel,
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub async fn run(self) -> RunReport {
        let start = Instant::now();
        let threads = self.config.threads;
        let timings = &self.config.timings;

        let barriers = Arc::new(PhaseBarriers::new(threads, timings.barrier_timeout));
        let deployment = match &self.config.contract {
            Some(contract) if contract.requires_deployment() && !self.config.registration_only => {
                Some(Arc::new(DeploymentGate::new(threads, timings.barrier_timeout)))
            }
            _ => None,
        };

        let context = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            daemon: self.daemon.clone(),
            wallets: Arc::clone(&self.wallets),
            stats: Arc::clone(&self.stats),
            barriers: Arc::clone(&barriers),
            deployment: deployment.clone(),
            cancel: self.cancel.clone(),
        });

        info!(
            "Starting {} workers with {} accounts each",
            threads, self.config.accounts_per_thread
        );
        let mut set = JoinSet::new();
        let mut tasks = HashMap::with_capacity(threads);
        for id in 0..threads {
            let worker = Worker::new(id, Arc::clone(&context));
            let handle = set.spawn(async move { worker.run().await });
            tasks.insert(handle.id(), id);
        }

        let mut report = RunReport::default();
        self.supervise(&mut set, &tasks, &mut report).await;
        report.workers.sort_by_key(|summary| summary.worker);

        report.interrupted = self.cancel.is_cancelled() && report.failures.is_empty();
        report.registrations = self.stats.registrations.snapshot();
        report.transactions = self.stats.transactions.snapshot();
        report.barrier_releases = Phase::ALL
            .iter()
            .map(|phase| (*phase, barriers.releases(*phase)))
            .collect();
        report.contract = deployment
            .as_ref()
            .and_then(|gate| gate.contract().cloned());

        info!("Registrations: {}", report.registrations);
        info!("{}", report.transactions);

        if let Some(output) = &self.config.output {
            let poller = ConfirmationPoller::new(
                self.daemon.clone(),
                self.config.wait_n_blocks,
                timings.confirmation_poll,
            );
            let hashes = self.stats.ledger.snapshot();
            match poller.reconcile(&hashes, output).await {
                Ok(reconciliation) => report.reconciliation = Some(reconciliation),
                Err(e) => {
                    error!("Error while reconciling transactions: {}", e);
                    report.reconciliation_error = Some(e.to_string());
                }
            }
        }

        report.elapsed = start.elapsed();
        report
    }

    // Wait for every worker. Cancels the run on the first failure and
    // aborts the workers still running once the grace period is over.
    async fn supervise(
        &self,
        set: &mut JoinSet<Result<WorkerSummary, WorkerError>>,
        tasks: &HashMap<Id, usize>,
        report: &mut RunReport,
    ) {
        let mut deadline: Option<Instant> = None;
        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, set.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Aborting {} workers still running after the grace period", set.len());
                        set.abort_all();
                        while set.join_next().await.is_some() {
                            report.stopped += 1;
                        }
                        return;
                    }
                },
                None => tokio::select! {
                    next = set.join_next_with_id() => next,
                    _ = self.cancel.cancelled() => {
                        deadline = Some(Instant::now() + self.config.timings.shutdown_grace);
                        continue;
                    }
                },
            };

            match next {
                None => return,
                Some(Ok((task, result))) => {
                    let id = tasks.get(&task).copied().unwrap_or_default();
                    self.on_worker_done(id, result, report);
                }
                Some(Err(e)) => {
                    let id = tasks.get(&e.id()).copied().unwrap_or_default();
                    error!("Worker #{} task failed: {}", id, e);
                    report.failures.push(format!("worker #{}: {}", id, e));
                    self.cancel.cancel();
                }
            }
        }
    }

    fn on_worker_done(&self, id: usize, result: Result<WorkerSummary, WorkerError>, report: &mut RunReport) {
        match result {
            Ok(summary) => {
                info!("Worker #{} done", id);
                report.workers.push(summary);
            }
            Err(e) if e.is_cancelled() => {
                info!("Worker #{} stopped", id);
                report.stopped += 1;
            }
            Err(e) => {
                error!("Worker #{} failed: {}", id, e);
                report.failures.push(format!("worker #{}: {}", id, e));
                self.cancel.cancel();
            }
        }
    }
}
