use {
    crate::{metadata, Coordinator, DiscoveryError},
    domain::{HaMode, Node, NodeKind, Topology},
    node_api::{Endpoint, NodeAddr, NodeConnection, TimeoutClass},
    tap::TapFallible,
};

impl<C: NodeConnection> Coordinator<C> {
    /// Finds the primary of the metadata shard and refreshes the list of
    /// metadata shard nodes from it.
    ///
    /// The round starts from the known primary, or from the bootstrap node if
    /// the primary isn't known yet. Returns the address of the primary.
    pub async fn discover_meta_primary(&self) -> Result<NodeAddr, DiscoveryError> {
        metrics::counter!("cmgr_discovery_total").increment(1);

        let mut state = self.lock().await;
        self.discover(&mut state.topology)
            .await
            .tap_err(|err| {
                metrics::counter!("cmgr_discovery_failures_total").increment(1);
                match err {
                    DiscoveryError::MultiplePrimaries(addrs) => {
                        tracing::error!(?addrs, "Metadata shard has multiple primaries");
                    }
                    err => tracing::warn!(?err, "Metadata shard primary discovery failed"),
                }
            })
    }

    async fn discover(&self, topology: &mut Topology) -> Result<NodeAddr, DiscoveryError> {
        let contact = topology.meta().contact();

        let rows = match self
            .execute(
                topology,
                &contact.endpoint,
                metadata::PRIMARY_MEMBERS,
                TimeoutClass::Short,
            )
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                // Start over from the bootstrap node next time.
                if contact.is_primary {
                    topology.meta_mut().clear_primary();
                }
                return Err(err.into());
            }
        };

        let primaries = rows
            .iter()
            .map(metadata::parse_member)
            .collect::<Result<Vec<_>, _>>()?;

        if primaries.len() > 1 {
            return Err(DiscoveryError::MultiplePrimaries(primaries));
        }

        let primary = match primaries.first() {
            None => self.assume_contact_is_primary(topology, &contact.endpoint).await?,
            Some(addr) if addr == &contact.endpoint.addr => {
                topology.meta_mut().set_ha_mode(HaMode::GroupReplication);
                topology.meta_mut().register_bootstrap();
                let _ = topology.meta_mut().register(meta_node(contact.endpoint.clone()));
                let _ = topology.meta_mut().set_primary(addr);
                contact.endpoint
            }
            Some(addr) => self.switch_primary(topology, &contact.endpoint, addr).await?,
        };

        let rows = self
            .execute(topology, &primary, metadata::META_NODES, TimeoutClass::Normal)
            .await?;
        let nodes = rows
            .iter()
            .map(metadata::parse_meta_node)
            .collect::<Result<Vec<_>, _>>()?;

        let diff = topology.meta_mut().reconcile(nodes);
        if !diff.is_empty() {
            tracing::info!(
                added = diff.added.len(),
                updated = diff.updated.len(),
                removed = diff.removed.len(),
                "Metadata shard nodes changed"
            );
        }

        Ok(primary.addr)
    }

    /// Handles a contact node which doesn't see any online primary: it's
    /// either the only node of the metadata shard, or isolated from the rest
    /// of the group. In both cases it's the only node we can talk to.
    async fn assume_contact_is_primary(
        &self,
        topology: &mut Topology,
        contact: &Endpoint,
    ) -> Result<Endpoint, DiscoveryError> {
        topology.meta_mut().register_bootstrap();
        let _ = topology.meta_mut().register(meta_node(contact.clone()));
        let _ = topology.meta_mut().set_primary(&contact.addr);

        let rows = self
            .execute(
                topology,
                contact,
                metadata::META_NODE_COUNT,
                TimeoutClass::Short,
            )
            .await?;

        if metadata::scalar(&rows) == Some("1") {
            topology.meta_mut().set_ha_mode(HaMode::NoReplication);
        } else {
            tracing::warn!(addr = %contact.addr, "Metadata shard contact doesn't see a primary");
        }

        Ok(contact.clone())
    }

    /// Switches to a primary other than the contact node. Its credentials are
    /// looked up in the roster stored on the contact node, replacing the ones
    /// of an already known node.
    async fn switch_primary(
        &self,
        topology: &mut Topology,
        contact: &Endpoint,
        addr: &NodeAddr,
    ) -> Result<Endpoint, DiscoveryError> {
        let rows = self
            .execute(topology, contact, metadata::META_NODES, TimeoutClass::Normal)
            .await?;

        let mut known = None;
        for row in &rows {
            let node = metadata::parse_meta_node(row)?;
            if node.addr() == addr {
                known = Some(node);
            }
        }

        topology.meta_mut().set_ha_mode(HaMode::GroupReplication);
        topology.meta_mut().register_bootstrap();
        let endpoint = match known {
            // The roster is authoritative for credentials.
            Some(node) => topology.meta_mut().upsert(node),
            None => {
                tracing::warn!(%addr, "Primary is missing in the roster, reusing contact credentials");
                let endpoint = Endpoint::new(addr.clone(), contact.credentials.clone());
                topology.meta_mut().register(meta_node(endpoint))
            }
        };
        let _ = topology.meta_mut().set_primary(addr);
        tracing::info!(%addr, "Metadata shard primary changed");

        Ok(endpoint)
    }
}

fn meta_node(endpoint: Endpoint) -> Node {
    Node::new(0, NodeKind::Meta, endpoint)
}
