use {
    crate::{
        metadata::{self, ShardUsage, TableStats},
        reconcile::parse_rows,
        Coordinator,
        Result,
    },
    domain::{ShardId, Topology},
    node_api::{Endpoint, NodeConnection, TimeoutClass},
    tap::TapFallible,
};

/// Outcome of a statistics refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsReport {
    /// Shards whose statistics were pushed.
    pub shards: usize,

    /// Shards skipped because their statistics couldn't be read.
    pub skipped: usize,
}

/// Shard to pull statistics from, with the computers of its cluster.
struct Source {
    cluster: String,
    shard: String,
    shard_id: ShardId,
    endpoint: Endpoint,
    computers: Vec<Endpoint>,
}

impl<C: NodeConnection> Coordinator<C> {
    /// Pulls table statistics and space usage from every storage shard and
    /// pushes them to the computers of the owning cluster. Space usage is
    /// also recorded in the metadata store.
    ///
    /// Statistics are read from the shard primary, or from any node of a
    /// shard without a known primary. Unreachable shards and computers are
    /// skipped, a metadata store failure aborts the refresh.
    pub async fn refresh_stats(&self) -> Result<StatsReport> {
        metrics::counter!("cmgr_refresh_total", "job" => "stats").increment(1);

        let mut state = self.lock().await;
        let topology = &mut state.topology;
        let _ = Self::meta_primary(topology)?;

        let mut report = StatsReport::default();
        for source in sources(topology) {
            let pushed = self
                .push_shard_stats(topology, &source)
                .await
                .tap_err(|err| {
                    metrics::counter!("cmgr_refresh_failures_total", "job" => "stats").increment(1);
                    tracing::warn!(?err, "Failed to record shard usage");
                })?;

            if pushed {
                report.shards += 1;
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }

    /// Returns `Ok(false)` if the shard couldn't be read.
    async fn push_shard_stats(&self, topology: &mut Topology, source: &Source) -> Result<bool> {
        let pulled = self.pull_shard_stats(topology, &source.endpoint).await;
        let (tables, usage) = match pulled {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(
                    ?err,
                    cluster = %source.cluster,
                    shard = %source.shard,
                    "Failed to read shard statistics"
                );
                return Ok(false);
            }
        };

        let mut statements: Vec<_> = tables.iter().map(metadata::update_table_stats).collect();
        statements.push(metadata::update_computer_shard_usage(source.shard_id, usage));

        for computer in &source.computers {
            for stmt in &statements {
                if let Err(err) = self
                    .execute(topology, computer, stmt, TimeoutClass::Normal)
                    .await
                {
                    tracing::warn!(?err, cluster = %source.cluster, "Failed to push statistics");
                    break;
                }
            }
        }

        let stmt = metadata::update_meta_shard_usage(source.shard_id, usage);
        let _ = self
            .execute_meta(topology, &stmt, TimeoutClass::Normal)
            .await?;

        Ok(true)
    }

    async fn pull_shard_stats(
        &self,
        topology: &mut Topology,
        endpoint: &Endpoint,
    ) -> Result<(Vec<TableStats>, ShardUsage)> {
        let tables = self
            .execute(topology, endpoint, metadata::TABLE_STATS, TimeoutClass::Long)
            .await?;
        let usage = self
            .execute(topology, endpoint, metadata::SHARD_USAGE, TimeoutClass::Long)
            .await?;

        let tables = parse_rows(&tables, metadata::parse_table_stats)?;
        let usage = usage
            .first()
            .map(metadata::parse_shard_usage)
            .transpose()?
            .unwrap_or_default();

        Ok((tables, usage))
    }
}

fn sources(topology: &Topology) -> Vec<Source> {
    let mut sources = Vec::new();

    for cluster in topology.clusters() {
        let computers: Vec<_> = cluster
            .computers()
            .iter()
            .map(|n| n.endpoint().clone())
            .collect();

        for shard in cluster.shards_by_id() {
            let Some(node) = shard.primary().or_else(|| shard.nodes().first()) else {
                continue;
            };

            sources.push(Source {
                cluster: cluster.name().to_owned(),
                shard: shard.name().to_owned(),
                shard_id: shard.id(),
                endpoint: node.endpoint().clone(),
                computers: computers.clone(),
            });
        }
    }

    sources
}
