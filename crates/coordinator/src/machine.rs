use {
    crate::{metadata, reconcile::parse_rows, Coordinator, Error, Result},
    domain::{ClusterId, Machine, NodeId, NodeKind, Topology},
    node_api::{NodeAddr, NodeConnection, TimeoutClass},
};

impl<C: NodeConnection> Coordinator<C> {
    /// Refreshes the list of [`Machine`]s from the metadata store.
    ///
    /// Instance counts and next ports of machines known before the refresh
    /// are kept.
    pub async fn machines(&self) -> Result<Vec<Machine>> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let rows = self
            .execute_meta(topology, metadata::MACHINES, TimeoutClass::Normal)
            .await?;
        let mut machines = parse_rows(&rows, metadata::parse_machine)?;

        for machine in &mut machines {
            if let Some(known) = topology.machine(&machine.hostaddr) {
                machine.storage_instances = known.storage_instances;
                machine.compute_instances = known.compute_instances;
                machine.next_storage_port = known.next_storage_port;
                machine.next_compute_port = known.next_compute_port;
            }
        }

        topology.set_machines(machines.clone());
        Ok(machines)
    }

    /// Indicates whether the metadata store knows a machine with the
    /// provided address.
    pub async fn has_machine(&self, hostaddr: &str) -> Result<bool> {
        let mut state = self.lock().await;
        let rows = self
            .execute_meta(
                &mut state.topology,
                &metadata::has_machine(hostaddr),
                TimeoutClass::Short,
            )
            .await?;

        Ok(metadata::parse_scalar::<u64>(&rows)?.unwrap_or_default() > 0)
    }

    /// Computes the ports the next storage and computer instances placed on
    /// the machine should use, from the instances recorded in the metadata
    /// store. Fails if the port range of the machine is exhausted.
    pub async fn machine_ports(&self, hostaddr: &str) -> Result<Machine> {
        let mut state = self.lock().await;
        let topology = &mut state.topology;

        let [meta, storage, compute] = metadata::machine_usage(hostaddr);
        let usage = metadata::instance_usage(
            self.instance_usage(topology, &meta).await?,
            self.instance_usage(topology, &storage).await?,
            self.instance_usage(topology, &compute).await?,
        );

        let machine = topology.machine_or_insert(hostaddr);
        machine.assign_ports(usage, self.port_floors)?;

        tracing::debug!(
            hostaddr,
            storage = machine.next_storage_port,
            compute = machine.next_compute_port,
            "Machine ports assigned"
        );

        Ok(machine.clone())
    }

    /// Records the status of a storage node or a computer in the metadata
    /// store.
    pub async fn update_instance_status(
        &self,
        addr: &NodeAddr,
        kind: NodeKind,
        status: &str,
    ) -> Result<()> {
        let stmt = metadata::update_instance_status(kind, addr, status)
            .ok_or(Error::NoStatus(kind))?;

        let mut state = self.lock().await;
        let _ = self
            .execute_meta(&mut state.topology, &stmt, TimeoutClass::Normal)
            .await?;
        Ok(())
    }

    /// Returns the largest cluster id recorded in the metadata store, `0` if
    /// there are no clusters.
    pub async fn max_cluster_id(&self) -> Result<ClusterId> {
        self.max_id(metadata::MAX_CLUSTER_ID).await
    }

    /// Returns the largest computer id recorded in the metadata store, `0` if
    /// there are no computers.
    pub async fn max_computer_id(&self) -> Result<NodeId> {
        self.max_id(metadata::MAX_COMPUTER_ID).await
    }

    async fn instance_usage(&self, topology: &mut Topology, query: &str) -> Result<(u32, u16)> {
        let rows = self
            .execute_meta(topology, query, TimeoutClass::Normal)
            .await?;
        let usage = rows.first().map(metadata::parse_usage).transpose()?;
        Ok(usage.unwrap_or_default())
    }

    async fn max_id(&self, query: &str) -> Result<u64> {
        let mut state = self.lock().await;
        let rows = self
            .execute_meta(&mut state.topology, query, TimeoutClass::Short)
            .await?;
        Ok(metadata::parse_scalar(&rows)?.unwrap_or_default())
    }
}
