//! Control-plane coordinator of the managed database clusters.
//!
//! [`Coordinator`] owns the in-memory [`Topology`] and keeps it in sync with
//! the metadata store. Every operation runs under a single lock, held across
//! the I/O the operation performs, so readers never observe a partially
//! applied change.

use {
    domain::{PortFloors, Topology},
    node_api::{Endpoint, NodeConnection, Row, TimeoutClass},
    tokio::sync::{Mutex, MutexGuard},
};

pub use error::{DiscoveryError, Error, Result};

mod admin;
mod backup;
mod commit_log;
mod discovery;
mod error;
mod machine;
mod mutation;
mod query;
mod reconcile;
mod stats;
mod variable;

pub mod metadata;

pub use {query::ClusterShape, stats::StatsReport, variable::VariableOutcome};

/// [`Coordinator`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Contact of the metadata shard used until its primary is discovered.
    pub bootstrap: Endpoint,

    pub port_floors: PortFloors,
}

/// Coordinator of the managed database clusters.
pub struct Coordinator<C> {
    conn: C,
    port_floors: PortFloors,
    state: Mutex<State>,
}

struct State {
    topology: Topology,

    /// Last commit log watermark a truncation was requested for.
    commit_log_watermark: Option<u64>,
}

impl<C: NodeConnection> Coordinator<C> {
    pub fn new(conn: C, config: Config) -> Self {
        Self {
            conn,
            port_floors: config.port_floors,
            state: Mutex::new(State {
                topology: Topology::new(config.bootstrap),
                commit_log_watermark: None,
            }),
        }
    }

    /// Returns the [`NodeConnection`] of this [`Coordinator`].
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Returns a copy of the current [`Topology`].
    pub async fn snapshot(&self) -> Topology {
        self.lock().await.topology.clone()
    }

    /// Releases every cluster and forgets the metadata shard. Returns the
    /// number of released clusters.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.lock().await;
        let clusters = state.topology.clear();
        state.commit_log_watermark = None;
        tracing::info!(clusters = clusters.len(), "Topology released");
        clusters.len()
    }

    async fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().await
    }

    /// Executes `query` on a node, recording the outcome in the session of
    /// the node if it's a part of the [`Topology`].
    async fn execute(
        &self,
        topology: &mut Topology,
        endpoint: &Endpoint,
        query: &str,
        timeout: TimeoutClass,
    ) -> node_api::Result<Vec<Row>> {
        let result = self.conn.execute(endpoint, query, timeout).await;

        if let Some(node) = topology.find_node_mut(&endpoint.addr) {
            node.session_mut().record(&result);
        }

        if let Err(err) = &result {
            tracing::debug!(?err, query, "Statement failed");
        }

        result
    }

    /// Returns the [`Endpoint`] of the metadata shard primary.
    fn meta_primary(topology: &Topology) -> Result<Endpoint> {
        topology
            .meta()
            .primary()
            .map(|node| node.endpoint().clone())
            .ok_or(Error::MetaPrimaryUnknown)
    }

    /// Executes `query` on the metadata shard primary.
    async fn execute_meta(
        &self,
        topology: &mut Topology,
        query: &str,
        timeout: TimeoutClass,
    ) -> Result<Vec<Row>> {
        let primary = Self::meta_primary(topology)?;
        Ok(self.execute(topology, &primary, query, timeout).await?)
    }

    /// Executes metadata writes of a mutation already applied to the
    /// [`Topology`], stopping at the first failure.
    async fn persist(
        &self,
        topology: &mut Topology,
        op: &'static str,
        statements: &[String],
    ) -> Result<()> {
        let primary = Self::meta_primary(topology)?;

        for stmt in statements {
            if let Err(source) = self
                .execute(topology, &primary, stmt, TimeoutClass::Normal)
                .await
            {
                metrics::counter!("cmgr_persistence_failures_total", "op" => op).increment(1);
                tracing::error!(?source, op, "Metadata store diverged from the topology");
                return Err(Error::Persistence { op, source });
            }
        }

        Ok(())
    }
}
