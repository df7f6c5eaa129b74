use {
    crate::{metadata, Coordinator, Error, Result},
    domain::{Node, Topology},
    node_api::{variable, NodeAddr, NodeConnection, TimeoutClass, VariableValue},
};

/// Outcome of an operation targeting a single node located by its address.
#[derive(Debug)]
pub enum VariableOutcome<T> {
    Done(T),

    /// No node of the topology listens on the address.
    NodeNotFound,

    Failed(Error),
}

impl<T> VariableOutcome<T> {
    fn from_result(res: Result<T>) -> Self {
        match res {
            Ok(value) => Self::Done(value),
            Err(err) => Self::Failed(err),
        }
    }
}

impl<C: NodeConnection> Coordinator<C> {
    /// Reads a run-time variable of the node listening on `addr`. The node
    /// may be a meta node, a storage node or a computer.
    pub async fn get_variable(&self, addr: &NodeAddr, name: &str) -> VariableOutcome<String> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let Some(node) = topology.find_node(addr).cloned() else {
            return VariableOutcome::NodeNotFound;
        };

        VariableOutcome::from_result(self.show_variable(topology, &node, name).await)
    }

    /// Assigns a run-time variable of the node listening on `addr`.
    pub async fn set_variable(
        &self,
        addr: &NodeAddr,
        name: &str,
        value: &VariableValue,
    ) -> VariableOutcome<()> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let Some(node) = topology.find_node(addr).cloned() else {
            return VariableOutcome::NodeNotFound;
        };

        let res = self.assign_variable(topology, &node, name, value).await;
        if res.is_ok() {
            tracing::info!(%addr, name, %value, "Variable set");
        }

        VariableOutcome::from_result(res)
    }

    /// Assigns several run-time variables of a storage node, stopping at the
    /// first failure. Returns `Ok(false)` if the node isn't a member of the
    /// shard.
    pub async fn set_shard_node_variables(
        &self,
        cluster: &str,
        shard: &str,
        addr: &NodeAddr,
        variables: &[(String, VariableValue)],
    ) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let node = topology
            .cluster(cluster)
            .and_then(|c| c.shard(shard))
            .and_then(|s| s.node_by_addr(addr))
            .cloned();
        let Some(node) = node else {
            return Ok(false);
        };

        for (name, value) in variables {
            self.assign_variable(topology, &node, name, value).await?;
        }

        tracing::info!(cluster, shard, %addr, count = variables.len(), "Variables set");
        Ok(true)
    }

    /// Records the identity of every shard of a cluster on the shard
    /// primary. Returns `Ok(false)` if the cluster doesn't exist.
    ///
    /// Nothing is written unless every shard has a primary.
    pub async fn sync_cluster_info(&self, cluster: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let Some(c) = topology.cluster(cluster) else {
            return Ok(false);
        };

        let mut targets = Vec::with_capacity(c.shards().len());
        for shard in c.shards() {
            let primary = shard.primary().ok_or_else(|| Error::PrimaryNotAvailable {
                cluster: cluster.to_owned(),
                shard: shard.name().to_owned(),
            })?;

            let stmt = metadata::write_cluster_info(cluster, shard.name());
            targets.push((primary.endpoint().clone(), stmt));
        }

        for (endpoint, stmt) in targets {
            self.execute(topology, &endpoint, &stmt, TimeoutClass::Normal)
                .await?;
        }

        Ok(true)
    }

    async fn show_variable(
        &self,
        topology: &mut Topology,
        node: &Node,
        name: &str,
    ) -> Result<String> {
        let query = variable::show(name)?;
        let rows = self
            .execute(topology, node.endpoint(), &query, TimeoutClass::Short)
            .await?;

        rows.first()
            .and_then(|row| row.get(1).cloned().flatten())
            .ok_or_else(|| Error::UnknownVariable(name.to_owned()))
    }

    async fn assign_variable(
        &self,
        topology: &mut Topology,
        node: &Node,
        name: &str,
        value: &VariableValue,
    ) -> Result<()> {
        let stmt = variable::set(name, value)?;
        self.execute(topology, node.endpoint(), &stmt, TimeoutClass::Short)
            .await?;
        Ok(())
    }
}
