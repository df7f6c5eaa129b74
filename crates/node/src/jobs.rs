//! Periodic coordinator jobs.

use {
    coordinator::Coordinator,
    node_api::NodeConnection,
    std::{sync::Arc, time::Duration},
    tokio::{
        task::JoinHandle,
        time::{self, Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
};

/// How often each job runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intervals {
    /// Metadata shard primary discovery followed by the refresh of storage
    /// shards and computers.
    pub refresh: Duration,

    pub stats: Duration,
    pub commit_log: Duration,
}

/// Handle to the running job scheduler.
pub struct Jobs {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Jobs {
    /// Spawns the scheduler. Topology refresh runs right away, the other jobs
    /// after their first interval.
    pub fn spawn<C: NodeConnection>(coordinator: Arc<Coordinator<C>>, intervals: Intervals) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(coordinator, intervals, token.clone()));

        Self { token, handle }
    }

    /// Stops the scheduler, waiting for the job in progress to finish.
    pub async fn stop(self) {
        self.token.cancel();

        if let Err(err) = self.handle.await {
            tracing::error!(?err, "Job scheduler failed");
        }
    }
}

async fn run<C: NodeConnection>(
    coordinator: Arc<Coordinator<C>>,
    intervals: Intervals,
    token: CancellationToken,
) {
    let mut refresh = time::interval(intervals.refresh);
    let mut stats = delayed_interval(intervals.stats);
    let mut commit_log = delayed_interval(intervals.commit_log);

    for interval in [&mut refresh, &mut stats, &mut commit_log] {
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = refresh.tick() => refresh_topology(&coordinator).await,

            _ = stats.tick() => {
                if let Err(err) = coordinator.refresh_stats().await {
                    tracing::debug!(?err, "Statistics refresh skipped");
                }
            }

            _ = commit_log.tick() => {
                if let Err(err) = coordinator.truncate_commit_log().await {
                    tracing::debug!(?err, "Commit log truncation skipped");
                }
            }
        }
    }

    tracing::info!("Job scheduler stopped");
}

/// Discovery failures are logged by the coordinator, the refresh is retried
/// on the next tick.
async fn refresh_topology<C: NodeConnection>(coordinator: &Coordinator<C>) {
    if coordinator.discover_meta_primary().await.is_err() {
        return;
    }

    let _ = coordinator.refresh_shards().await;
    let _ = coordinator.refresh_computers().await;
}

fn delayed_interval(period: Duration) -> time::Interval {
    time::interval_at(Instant::now() + period, period)
}
