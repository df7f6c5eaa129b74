use {
    crate::{metadata, metadata::RowError, Coordinator, Result},
    domain::{
        roster::{ComputerRoster, StorageRoster},
        Diff,
        Topology,
    },
    node_api::{NodeConnection, Row, TimeoutClass},
    tap::TapFallible,
};

impl<C: NodeConnection> Coordinator<C> {
    /// Reconciles clusters, shards and storage nodes against the metadata
    /// store. Returns what changed.
    pub async fn refresh_shards(&self) -> Result<Diff> {
        metrics::counter!("cmgr_refresh_total", "job" => "shards").increment(1);

        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let roster = self.storage_roster(topology).await.tap_err(|err| {
            metrics::counter!("cmgr_refresh_failures_total", "job" => "shards").increment(1);
            tracing::warn!(?err, "Failed to read storage roster");
        })?;

        let diff = topology.reconcile_storage(roster);
        log_diff("shards", &diff);
        update_gauges(topology);

        Ok(diff)
    }

    /// Reconciles clusters and computers against the metadata store. Returns
    /// what changed.
    pub async fn refresh_computers(&self) -> Result<Diff> {
        metrics::counter!("cmgr_refresh_total", "job" => "computers").increment(1);

        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let roster = self.computer_roster(topology).await.tap_err(|err| {
            metrics::counter!("cmgr_refresh_failures_total", "job" => "computers").increment(1);
            tracing::warn!(?err, "Failed to read computer roster");
        })?;

        let diff = topology.reconcile_computers(roster);
        log_diff("computers", &diff);
        update_gauges(topology);

        Ok(diff)
    }

    async fn storage_roster(&self, topology: &mut Topology) -> Result<StorageRoster> {
        let clusters = self.query_meta(topology, metadata::CLUSTERS).await?;
        let shards = self.query_meta(topology, metadata::SHARDS).await?;
        let nodes = self.query_meta(topology, metadata::SHARD_NODES).await?;

        Ok(StorageRoster {
            clusters: parse_rows(&clusters, metadata::parse_cluster)?,
            shards: parse_rows(&shards, metadata::parse_shard)?,
            nodes: parse_rows(&nodes, metadata::parse_storage_node)?,
        })
    }

    async fn computer_roster(&self, topology: &mut Topology) -> Result<ComputerRoster> {
        let clusters = self.query_meta(topology, metadata::CLUSTERS).await?;
        let computers = self.query_meta(topology, metadata::COMP_NODES).await?;

        Ok(ComputerRoster {
            clusters: parse_rows(&clusters, metadata::parse_cluster)?,
            computers: parse_rows(&computers, metadata::parse_computer)?,
        })
    }

    async fn query_meta(&self, topology: &mut Topology, query: &str) -> Result<Vec<Row>> {
        self.execute_meta(topology, query, TimeoutClass::Normal)
            .await
    }
}

pub(crate) fn parse_rows<T>(
    rows: &[Row],
    parse: impl Fn(&Row) -> Result<T, RowError>,
) -> Result<Vec<T>, RowError> {
    rows.iter().map(parse).collect()
}

fn log_diff(job: &'static str, diff: &Diff) {
    if diff.is_empty() {
        return;
    }

    for node in &diff.removed {
        tracing::info!(job, id = node.id(), addr = %node.addr(), "Node removed");
    }

    tracing::info!(
        job,
        added = diff.added.len(),
        updated = diff.updated.len(),
        removed = diff.removed.len(),
        "Topology changed"
    );
}

pub(crate) fn update_gauges(topology: &Topology) {
    metrics::gauge!("cmgr_clusters").set(topology.clusters().len() as f64);
    metrics::gauge!("cmgr_storage_nodes").set(topology.storage_node_count() as f64);
    metrics::gauge!("cmgr_computers").set(topology.computer_count() as f64);
}
