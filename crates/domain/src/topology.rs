use {
    crate::{
        cluster::RemoteShard,
        roster::{ClusterRecord, ComputerRoster, StorageRoster},
        Cluster,
        ClusterId,
        Diff,
        Machine,
        MetaShard,
        Node,
    },
    node_api::{Endpoint, NodeAddr},
    std::mem,
};

/// Everything the coordinator knows about the managed clusters.
#[derive(Clone, Debug)]
pub struct Topology {
    meta: MetaShard,
    clusters: Vec<Cluster>,
    machines: Vec<Machine>,
}

impl Topology {
    /// Creates an empty [`Topology`] with the bootstrap contact of the
    /// metadata shard.
    pub fn new(bootstrap: Endpoint) -> Self {
        Self {
            meta: MetaShard::new(bootstrap),
            clusters: Vec::new(),
            machines: Vec::new(),
        }
    }

    pub fn meta(&self) -> &MetaShard {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut MetaShard {
        &mut self.meta
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name() == name)
    }

    pub fn cluster_mut(&mut self, name: &str) -> Option<&mut Cluster> {
        self.clusters.iter_mut().find(|c| c.name() == name)
    }

    /// Detaches the named [`Cluster`] with all its shards and computers.
    pub fn remove_cluster(&mut self, name: &str) -> Option<Cluster> {
        let idx = self.clusters.iter().position(|c| c.name() == name)?;
        Some(self.clusters.remove(idx))
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn machine(&self, hostaddr: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.hostaddr == hostaddr)
    }

    pub fn machine_mut(&mut self, hostaddr: &str) -> Option<&mut Machine> {
        self.machines.iter_mut().find(|m| m.hostaddr == hostaddr)
    }

    /// Returns the [`Machine`] with the provided address, registering it if
    /// it's unknown.
    pub fn machine_or_insert(&mut self, hostaddr: &str) -> &mut Machine {
        let idx = match self.machines.iter().position(|m| m.hostaddr == hostaddr) {
            Some(idx) => idx,
            None => {
                self.machines.push(Machine::new(hostaddr));
                self.machines.len() - 1
            }
        };

        &mut self.machines[idx]
    }

    pub fn set_machines(&mut self, machines: Vec<Machine>) {
        self.machines = machines;
    }

    /// Finds the [`Node`] listening on `addr`, looking at the meta shard
    /// first, then at the storage nodes and computers of every cluster.
    pub fn find_node(&self, addr: &NodeAddr) -> Option<&Node> {
        if let Some(node) = self.meta.node(addr) {
            return Some(node);
        }

        self.clusters.iter().find_map(|cluster| {
            cluster
                .storage_nodes()
                .map(|(_, node)| node)
                .chain(cluster.computers())
                .find(|node| node.addr() == addr)
        })
    }

    /// Mutable counterpart of [`Topology::find_node`].
    pub fn find_node_mut(&mut self, addr: &NodeAddr) -> Option<&mut Node> {
        if self.meta.node(addr).is_some() {
            return self.meta.node_mut(addr);
        }

        let cluster = self.clusters.iter_mut().find(|c| {
            c.storage_nodes().any(|(_, n)| n.addr() == addr)
                || c.computers().iter().any(|n| n.addr() == addr)
        })?;

        if let Some(idx) = cluster
            .shards()
            .iter()
            .position(|s| s.node_by_addr(addr).is_some())
        {
            return cluster.shards_mut()[idx].node_by_addr_mut(addr);
        }

        cluster.computers_mut().iter_mut().find(|n| n.addr() == addr)
    }

    /// Total number of storage nodes across all clusters.
    pub fn storage_node_count(&self) -> usize {
        self.clusters.iter().map(|c| c.storage_nodes().count()).sum()
    }

    /// Total number of computers across all clusters.
    pub fn computer_count(&self) -> usize {
        self.clusters.iter().map(|c| c.computers().len()).sum()
    }

    /// Reconciles clusters, shards and storage nodes against the
    /// [`StorageRoster`].
    pub fn reconcile_storage(&mut self, roster: StorageRoster) -> Diff {
        let mut diff = self.reconcile_clusters(&roster.clusters);

        for cluster in &mut self.clusters {
            let remote = roster
                .shards
                .iter()
                .filter(|s| s.cluster_id == cluster.id())
                .map(|s| {
                    let records = roster
                        .nodes
                        .iter()
                        .filter(|n| n.cluster_id == s.cluster_id && n.shard_id == s.id);

                    RemoteShard {
                        id: s.id,
                        name: s.name.clone(),
                        nodes: records.clone().map(|n| n.to_node()).collect(),
                        primary: records.filter(|n| n.is_primary).map(|n| n.id).last(),
                    }
                })
                .collect();

            diff.merge(cluster.reconcile_shards(remote));
        }

        for orphan in roster.nodes.iter().filter(|n| {
            !roster
                .shards
                .iter()
                .any(|s| s.cluster_id == n.cluster_id && s.id == n.shard_id)
        }) {
            tracing::warn!(
                id = orphan.id,
                shard_id = orphan.shard_id,
                addr = %orphan.endpoint.addr,
                "Storage node of an unknown shard"
            );
        }

        diff
    }

    /// Reconciles clusters and computers against the [`ComputerRoster`].
    pub fn reconcile_computers(&mut self, roster: ComputerRoster) -> Diff {
        let mut diff = self.reconcile_clusters(&roster.clusters);

        for cluster in &mut self.clusters {
            let remote = roster
                .computers
                .iter()
                .filter(|c| c.cluster_id == cluster.id())
                .map(|c| c.to_node())
                .collect();

            diff.merge(cluster.reconcile_computers(remote));
        }

        diff
    }

    /// Creates, renames and drops [`Cluster`]s. Nodes of the dropped clusters
    /// are reported as removed.
    ///
    /// Records repeating the id or the name of an earlier record are
    /// ignored, and a local cluster matching only an ignored record is
    /// dropped.
    fn reconcile_clusters(&mut self, records: &[ClusterRecord]) -> Diff {
        let mut accepted: Vec<&ClusterRecord> = Vec::with_capacity(records.len());
        for record in records {
            if accepted.iter().any(|r| r.id == record.id) {
                continue;
            }

            if accepted.iter().any(|r| r.name == record.name) {
                tracing::warn!(id = record.id, name = %record.name, "Duplicate cluster name");
                continue;
            }

            accepted.push(record);
        }

        let mut diff = Diff::default();

        self.clusters.retain_mut(|cluster| {
            if accepted.iter().any(|r| r.id == cluster.id()) {
                return true;
            }

            diff.removed.extend(cluster.release());
            false
        });

        for record in accepted {
            match self.clusters.iter_mut().find(|c| c.id() == record.id) {
                Some(cluster) => {
                    if cluster.name() != record.name {
                        cluster.set_name(record.name.clone());
                    }
                    cluster.set_ha_mode(record.ha_mode);
                }
                None => self
                    .clusters
                    .push(Cluster::new(record.id, record.name.clone(), record.ha_mode)),
            }
        }

        diff
    }

    /// Releases every [`Cluster`] and meta [`Node`].
    pub fn clear(&mut self) -> Vec<Cluster> {
        let _ = self.meta.clear();
        self.machines.clear();
        mem::take(&mut self.clusters)
    }
}
