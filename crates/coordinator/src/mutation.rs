//! Mutations of the topology.
//!
//! The in-memory [`Topology`](domain::Topology) is changed first, then the
//! change is persisted to the metadata store. A failed metadata write is
//! reported as [`Error::Persistence`], the in-memory change is not rolled
//! back.
//!
//! Every mutation confirms that the metadata shard primary is known before
//! touching the topology. Mutations of entities unknown to the coordinator
//! still delete them from the metadata store and return `Ok(false)`.

use {
    crate::{metadata, reconcile, Coordinator, Error, Result},
    domain::{Cluster, Node, NodeKind},
    node_api::{Endpoint, NodeAddr, NodeConnection, TimeoutClass},
};

impl<C: NodeConnection> Coordinator<C> {
    /// Adds storage nodes to a shard.
    ///
    /// Node ids continue after the largest storage node id known locally or
    /// recorded in the metadata store. Returns `Ok(false)` if the cluster or
    /// the shard doesn't exist.
    pub async fn add_shard_nodes(
        &self,
        cluster: &str,
        shard: &str,
        endpoints: Vec<Endpoint>,
    ) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let rows = self
            .execute_meta(topology, metadata::MAX_SHARD_NODE_ID, TimeoutClass::Normal)
            .await?;
        let local_next = topology
            .clusters()
            .iter()
            .filter_map(Cluster::max_storage_node_id)
            .max()
            .map_or(1, |id| id + 1);
        let mut next_id = metadata::next_id(&rows)?.max(local_next);

        let Some(c) = topology.cluster_mut(cluster) else {
            return Ok(false);
        };
        let cluster_id = c.id();
        let Some(s) = c.shard_mut(shard) else {
            return Ok(false);
        };

        for (idx, endpoint) in endpoints.iter().enumerate() {
            let requested_twice = endpoints[..idx].iter().any(|e| e.addr == endpoint.addr);
            if requested_twice || s.node_by_addr(&endpoint.addr).is_some() {
                return Err(Error::DuplicateNode(endpoint.addr.clone()));
            }
        }

        let shard_id = s.id();
        let mut statements = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let node = Node::new(next_id, NodeKind::Storage, endpoint);
            next_id += 1;

            statements.push(metadata::insert_shard_node(cluster_id, shard_id, &node));
            tracing::info!(cluster, shard, id = node.id(), addr = %node.addr(), "Adding shard node");
            let _ = s.add_node(node);
        }

        reconcile::update_gauges(topology);
        self.persist(topology, "shard nodes", &statements).await?;
        Ok(true)
    }

    /// Removes a cluster with all its shards and computers.
    pub async fn stop_cluster(&self, cluster: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;
        let _ = Self::meta_primary(topology)?;

        let removed = topology.remove_cluster(cluster).map(|mut c| c.release());
        if let Some(nodes) = &removed {
            tracing::info!(cluster, nodes = nodes.len(), "Cluster stopped");
        }

        reconcile::update_gauges(topology);
        self.persist(topology, "cluster removal", &metadata::delete_cluster(cluster))
            .await?;
        Ok(removed.is_some())
    }

    /// Removes a shard with all its nodes.
    pub async fn stop_shard(&self, cluster: &str, shard: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;
        let _ = Self::meta_primary(topology)?;

        let removed = topology
            .cluster_mut(cluster)
            .and_then(|c| c.remove_shard(shard))
            .inspect(|s| tracing::info!(cluster, shard, nodes = s.nodes().len(), "Shard stopped"));

        reconcile::update_gauges(topology);
        self.persist(topology, "shard removal", &metadata::delete_shard(cluster, shard))
            .await?;
        Ok(removed.is_some())
    }

    /// Removes a single storage node. Removing the primary leaves the shard
    /// without one until the next reconciliation.
    pub async fn stop_shard_node(
        &self,
        cluster: &str,
        shard: &str,
        addr: &NodeAddr,
    ) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;
        let _ = Self::meta_primary(topology)?;

        let removed = topology
            .cluster_mut(cluster)
            .and_then(|c| c.shard_mut(shard))
            .and_then(|s| s.remove_node_by_addr(addr))
            .inspect(|n| tracing::info!(cluster, shard, id = n.id(), %addr, "Shard node stopped"));

        reconcile::update_gauges(topology);
        let stmt = metadata::delete_shard_node(cluster, shard, addr);
        self.persist(topology, "shard node removal", &[stmt]).await?;
        Ok(removed.is_some())
    }

    pub async fn stop_computer(&self, cluster: &str, name: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;
        let _ = Self::meta_primary(topology)?;

        let removed = topology
            .cluster_mut(cluster)
            .and_then(|c| c.remove_computer(name))
            .inspect(|n| tracing::info!(cluster, name, addr = %n.addr(), "Computer stopped"));

        reconcile::update_gauges(topology);
        let stmt = metadata::delete_computer(cluster, name);
        self.persist(topology, "computer removal", &[stmt]).await?;
        Ok(removed.is_some())
    }

    /// Forgets the primaries of every shard of a cluster. They are learned
    /// again by the next reconciliation.
    pub async fn clear_shard_primaries(&self, cluster: &str) -> bool {
        let mut state = self.lock().await;
        let Some(c) = state.topology.cluster_mut(cluster) else {
            return false;
        };

        for shard in c.shards_mut() {
            shard.clear_primary();
        }
        true
    }
}
