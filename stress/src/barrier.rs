//! Named rendezvous points shared by every worker of a run.
//!
//! A barrier releases its waiters only once the whole cohort arrived.
//! Without a timeout, a worker that never arrives keeps the others
//! blocked until the run is cancelled: the cohort fails stop instead of
//! moving on with a partial set of accounts.

use crate::shutdown::Cancelled;
use log::{debug, info};
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    // every worker generated its registration transactions
    RegistrationReady,
    // every worker saw all its accounts registered
    RegistrationConfirmed,
    // every worker generated its batch of transactions
    TxGenerated,
}

impl Phase {
    pub const ALL: [Phase; 3] = [
        Phase::RegistrationReady,
        Phase::RegistrationConfirmed,
        Phase::TxGenerated,
    ];

    fn index(self) -> usize {
        match self {
            Phase::RegistrationReady => 0,
            Phase::RegistrationConfirmed => 1,
            Phase::TxGenerated => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::RegistrationReady => "registration ready",
            Phase::RegistrationConfirmed => "registration confirmed",
            Phase::TxGenerated => "transactions generated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BarrierError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("timed out after {timeout:?} waiting at barrier '{phase}'")]
    TimedOut { phase: Phase, timeout: Duration },
}

// Wait on a barrier until released, cancelled or timed out.
// Returns true for the single waiter elected leader of the release.
pub(crate) async fn wait_barrier(
    barrier: &Barrier,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<bool, Option<Duration>> {
    let wait = async {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, barrier.wait())
                .await
                .map_err(|_| Some(timeout)),
            None => Ok(barrier.wait().await),
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(None),
        result = wait => result.map(|r| r.is_leader()),
    }
}

pub struct PhaseBarriers {
    workers: usize,
    timeout: Option<Duration>,
    barriers: [Barrier; 3],
    arrivals: [AtomicUsize; 3],
    releases: [AtomicUsize; 3],
}

impl PhaseBarriers {
    pub fn new(workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            workers,
            timeout,
            barriers: [
                Barrier::new(workers),
                Barrier::new(workers),
                Barrier::new(workers),
            ],
            arrivals: Default::default(),
            releases: Default::default(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn wait(
        &self,
        phase: Phase,
        worker: usize,
        cancel: &CancellationToken,
    ) -> Result<(), BarrierError> {
        let i = phase.index();
        let arrived = self.arrivals[i].fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "Worker #{} waiting at barrier '{}' ({}/{})",
            worker, phase, arrived, self.workers
        );

        match wait_barrier(&self.barriers[i], self.timeout, cancel).await {
            Ok(is_leader) => {
                if is_leader {
                    self.releases[i].fetch_add(1, Ordering::SeqCst);
                    info!("All {} workers reached barrier '{}'", self.workers, phase);
                }
                Ok(())
            }
            Err(Some(timeout)) => Err(BarrierError::TimedOut { phase, timeout }),
            Err(None) => Err(Cancelled.into()),
        }
    }

    // Number of workers that reached the barrier so far
    pub fn arrivals(&self, phase: Phase) -> usize {
        self.arrivals[phase.index()].load(Ordering::SeqCst)
    }

    // Number of times the barrier released its cohort
    pub fn releases(&self, phase: Phase) -> usize {
        self.releases[phase.index()].load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn spawn_waiter(
        barriers: &Arc<PhaseBarriers>,
        phase: Phase,
        worker: usize,
        cancel: &CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), BarrierError>> {
        let barriers = Arc::clone(barriers);
        let cancel = cancel.clone();
        tokio::spawn(async move { barriers.wait(phase, worker, &cancel).await })
    }

    #[tokio::test]
    async fn test_full_cohort_released_once() {
        let barriers = Arc::new(PhaseBarriers::new(3, None));
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (0..3)
            .map(|w| spawn_waiter(&barriers, Phase::RegistrationReady, w, &cancel))
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(barriers.releases(Phase::RegistrationReady), 1);
        assert_eq!(barriers.arrivals(Phase::RegistrationReady), 3);
        assert_eq!(barriers.releases(Phase::TxGenerated), 0);
    }

    #[tokio::test]
    async fn test_missing_worker_blocks_cohort() {
        let barriers = Arc::new(PhaseBarriers::new(3, None));
        let cancel = CancellationToken::new();

        // worker #2 never arrives
        let mut handles: Vec<_> = (0..2)
            .map(|w| spawn_waiter(&barriers, Phase::RegistrationConfirmed, w, &cancel))
            .collect();

        tokio::time::sleep(Duration::from_millis(200)).await;
        for handle in &handles {
            assert!(!handle.is_finished());
        }
        assert_eq!(barriers.releases(Phase::RegistrationConfirmed), 0);

        // they unwind only once the run is cancelled
        cancel.cancel();
        for handle in handles.drain(..) {
            assert!(matches!(
                handle.await.unwrap(),
                Err(BarrierError::Cancelled(_))
            ));
        }
        assert_eq!(barriers.releases(Phase::RegistrationConfirmed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_configured() {
        let barriers = PhaseBarriers::new(2, Some(Duration::from_secs(10)));
        let cancel = CancellationToken::new();

        let result = barriers.wait(Phase::TxGenerated, 0, &cancel).await;
        assert!(matches!(
            result,
            Err(BarrierError::TimedOut {
                phase: Phase::TxGenerated,
                ..
            })
        ));
    }
}
