//! Read-only views of the topology.
//!
//! Views of a missing cluster, shard or computer are [`None`].

use {
    crate::Coordinator,
    admin_api::{ClusterSummary, NodeInfo},
    domain::{Cluster, HaMode, Node, NodeKind, Shard},
    node_api::{NodeAddr, NodeConnection},
};

/// Number of shards of a cluster, nodes of its first shard and computers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterShape {
    pub shards: usize,
    pub shard_nodes: usize,
    pub computers: usize,
}

impl<C: NodeConnection> Coordinator<C> {
    /// Returns the address of the metadata shard primary, if known.
    pub async fn meta_primary_addr(&self) -> Option<NodeAddr> {
        let state = self.lock().await;
        state.topology.meta().primary().map(|n| n.addr().clone())
    }

    pub async fn meta_ha_mode(&self) -> HaMode {
        self.lock().await.topology.meta().ha_mode()
    }

    pub async fn meta_nodes(&self) -> Vec<NodeInfo> {
        let state = self.lock().await;
        state
            .topology
            .meta()
            .nodes()
            .iter()
            .map(|n| node_info(n, None, None))
            .collect()
    }

    pub async fn clusters(&self) -> Vec<ClusterSummary> {
        let state = self.lock().await;
        state
            .topology
            .clusters()
            .iter()
            .map(|c| ClusterSummary {
                name: c.name().to_owned(),
                shards: c.shards().len(),
                comps: c.computers().len(),
            })
            .collect()
    }

    pub async fn storage_nodes(&self, cluster: &str) -> Option<Vec<NodeInfo>> {
        self.with_cluster(cluster, |c| {
            c.storage_nodes()
                .map(|(s, n)| node_info(n, Some(c), Some(s)))
                .collect()
        })
        .await
    }

    pub async fn computers(&self, cluster: &str) -> Option<Vec<NodeInfo>> {
        self.with_cluster(cluster, |c| {
            c.computers()
                .iter()
                .map(|n| node_info(n, Some(c), None))
                .collect()
        })
        .await
    }

    /// Lists the nodes of the provided kind (or of every kind) placed on any
    /// of the provided hosts. Hosts are matched by IP only, an empty list
    /// matches every host.
    pub async fn instances(&self, kind: Option<NodeKind>, hosts: &[String]) -> Vec<NodeInfo> {
        let state = self.lock().await;
        let topology = &state.topology;

        let wanted = &|node: &Node| {
            kind.map_or(true, |k| k == node.kind())
                && (hosts.is_empty() || hosts.iter().any(|h| h == &node.addr().host))
        };

        let meta = topology
            .meta()
            .nodes()
            .iter()
            .filter(|&n| wanted(n))
            .map(|n| node_info(n, None, None));

        let clusters = topology.clusters().iter().flat_map(move |c| {
            let computers = c
                .computers()
                .iter()
                .filter(move |&n| wanted(n))
                .map(move |n| node_info(n, Some(c), None));

            c.storage_nodes()
                .filter(move |&(_, n)| wanted(n))
                .map(move |(s, n)| node_info(n, Some(c), Some(s)))
                .chain(computers)
        });

        meta.chain(clusters).collect()
    }

    pub async fn has_cluster(&self, cluster: &str) -> bool {
        self.with_cluster(cluster, |_| ()).await.is_some()
    }

    pub async fn has_shard(&self, cluster: &str, shard: &str) -> bool {
        self.with_cluster(cluster, |c| c.shard(shard).is_some())
            .await
            .unwrap_or_default()
    }

    pub async fn has_multiple_shards(&self, cluster: &str) -> bool {
        self.with_cluster(cluster, |c| c.shards().len() > 1)
            .await
            .unwrap_or_default()
    }

    pub async fn has_multiple_shard_nodes(&self, cluster: &str, shard: &str) -> bool {
        self.with_cluster(cluster, |c| c.shard(shard).is_some_and(|s| s.nodes().len() > 1))
            .await
            .unwrap_or_default()
    }

    pub async fn has_multiple_computers(&self, cluster: &str) -> bool {
        self.with_cluster(cluster, |c| c.computers().len() > 1)
            .await
            .unwrap_or_default()
    }

    pub async fn shard_names(&self, cluster: &str) -> Option<Vec<String>> {
        self.with_cluster(cluster, |c| {
            c.shards().iter().map(|s| s.name().to_owned()).collect()
        })
        .await
    }

    /// Returns the position of a shard within its cluster, shards being
    /// ordered by id.
    pub async fn shard_order(&self, cluster: &str, shard: &str) -> Option<usize> {
        self.with_cluster(cluster, |c| c.shard_order(shard))
            .await
            .flatten()
    }

    /// Largest numeric suffix among the shard names of a cluster, `0` if
    /// there's none.
    pub async fn max_shard_suffix(&self, cluster: &str) -> Option<u64> {
        self.with_cluster(cluster, Cluster::max_shard_suffix).await
    }

    /// Largest numeric suffix among the computer names of a cluster, `0` if
    /// there's none.
    pub async fn max_computer_suffix(&self, cluster: &str) -> Option<u64> {
        self.with_cluster(cluster, Cluster::max_computer_suffix)
            .await
    }

    /// Node addresses of every shard of a cluster.
    pub async fn shard_addrs(&self, cluster: &str) -> Option<Vec<Vec<NodeAddr>>> {
        self.with_cluster(cluster, |c| c.shards().iter().map(shard_addrs).collect())
            .await
    }

    pub async fn shard_node_addrs(&self, cluster: &str, shard: &str) -> Option<Vec<NodeAddr>> {
        self.with_cluster(cluster, |c| c.shard(shard).map(shard_addrs))
            .await
            .flatten()
    }

    pub async fn computer_addrs(&self, cluster: &str) -> Option<Vec<NodeAddr>> {
        self.with_cluster(cluster, |c| {
            c.computers().iter().map(|n| n.addr().clone()).collect()
        })
        .await
    }

    pub async fn computer_addr(&self, cluster: &str, name: &str) -> Option<NodeAddr> {
        self.with_cluster(cluster, |c| c.computer(name).map(|n| n.addr().clone()))
            .await
            .flatten()
    }

    /// Picks a node to back up every shard of a cluster from, shards being
    /// ordered by id. Returns [`None`] if any of the shards has no nodes.
    pub async fn backup_targets(&self, cluster: &str) -> Option<Vec<NodeAddr>> {
        self.with_cluster(cluster, |c| {
            c.shards_by_id()
                .into_iter()
                .map(|s| s.backup_node().map(|n| n.addr().clone()))
                .collect::<Option<Vec<_>>>()
        })
        .await
        .flatten()
    }

    /// Node addresses of every shard of a cluster, shards being ordered by
    /// id.
    pub async fn restore_targets(&self, cluster: &str) -> Option<Vec<Vec<NodeAddr>>> {
        self.with_cluster(cluster, |c| {
            c.shards_by_id().into_iter().map(shard_addrs).collect()
        })
        .await
    }

    /// Computer addresses of a cluster, ordered by id.
    pub async fn restore_computer_targets(&self, cluster: &str) -> Option<Vec<NodeAddr>> {
        self.with_cluster(cluster, |c| {
            let mut computers: Vec<_> = c.computers().iter().collect();
            computers.sort_by_key(|n| n.id());
            computers.into_iter().map(|n| n.addr().clone()).collect()
        })
        .await
    }

    /// Returns [`None`] if the cluster doesn't exist or has no shards.
    pub async fn cluster_shape(&self, cluster: &str) -> Option<ClusterShape> {
        self.with_cluster(cluster, |c| {
            let first = c.shards().first()?;
            Some(ClusterShape {
                shards: c.shards().len(),
                shard_nodes: first.nodes().len(),
                computers: c.computers().len(),
            })
        })
        .await
        .flatten()
    }

    /// Indicates whether the first shard of a cluster is group-replicated.
    pub async fn is_group_replicated(&self, cluster: &str) -> bool {
        self.with_cluster(cluster, |c| {
            c.shards()
                .first()
                .is_some_and(|s| s.ha_mode() == HaMode::GroupReplication)
        })
        .await
        .unwrap_or_default()
    }

    /// Returns the address of the primary of a shard, if known.
    pub async fn shard_primary(&self, cluster: &str, shard: &str) -> Option<NodeAddr> {
        self.with_cluster(cluster, |c| {
            c.shard(shard)
                .and_then(Shard::primary)
                .map(|n| n.addr().clone())
        })
        .await
        .flatten()
    }

    async fn with_cluster<T>(&self, name: &str, f: impl FnOnce(&Cluster) -> T) -> Option<T> {
        self.lock().await.topology.cluster(name).map(f)
    }
}

fn shard_addrs(shard: &Shard) -> Vec<NodeAddr> {
    shard.nodes().iter().map(|n| n.addr().clone()).collect()
}

fn node_info(node: &Node, cluster: Option<&Cluster>, shard: Option<&Shard>) -> NodeInfo {
    let addr = node.addr();
    let creds = node.credentials();

    NodeInfo {
        ip: addr.host.clone(),
        port: addr.port,
        user: creds.user.clone(),
        password: creds.password.clone(),
        cluster: cluster.map(|c| c.name().to_owned()),
        shard: shard.map(|s| s.name().to_owned()),
        comp: node.name().map(ToOwned::to_owned),
    }
}
